//! Descriptor builders, one per REST v3 operation.
//!
//! Inputs are assumed already validated (issue key shape etc.); these only
//! lay out paths, query parameters and JSON bodies.

use serde_json::{json, Value};

use crate::request::RequestDescriptor;

const API: &str = "/rest/api/3";

fn issue_path(key: &str) -> String {
    format!("{}/issue/{}", API, key)
}

fn with_fields(desc: RequestDescriptor, fields: &[String]) -> RequestDescriptor {
    if fields.is_empty() {
        desc
    } else {
        desc.query("fields", fields.join(","))
    }
}

/// Cache key for an idempotent read: `cache:<resource-type>:<resource-id>`.
pub fn cache_key(resource_type: &str, id: &str) -> String {
    format!("cache:{}:{}", resource_type, id)
}

pub fn get_issue(key: &str, fields: &[String]) -> RequestDescriptor {
    with_fields(RequestDescriptor::get(issue_path(key)), fields)
}

/// `fields` is the issue `fields` object (project, summary, issuetype, ...).
pub fn create_issue(fields: Value) -> RequestDescriptor {
    RequestDescriptor::post(format!("{}/issue", API)).json(json!({ "fields": fields }))
}

pub fn update_issue(key: &str, fields: Value) -> RequestDescriptor {
    RequestDescriptor::put(issue_path(key)).json(json!({ "fields": fields }))
}

pub fn delete_issue(key: &str, delete_subtasks: bool) -> RequestDescriptor {
    let desc = RequestDescriptor::delete(issue_path(key));
    if delete_subtasks {
        desc.query("deleteSubtasks", "true")
    } else {
        desc
    }
}

/// JQL search. `start_at` is sent as the paging offset.
pub fn search_issues(
    jql: &str,
    start_at: u32,
    max_results: u32,
    fields: &[String],
) -> RequestDescriptor {
    let desc = RequestDescriptor::get(format!("{}/search/jql", API))
        .query("jql", jql)
        .query("startAt", start_at.to_string())
        .query("maxResults", max_results.to_string());
    with_fields(desc, fields)
}

pub fn get_transitions(key: &str) -> RequestDescriptor {
    RequestDescriptor::get(format!("{}/transitions", issue_path(key)))
}

/// Move an issue through a workflow transition, optionally setting fields
/// the transition screen requires.
pub fn transition_issue(key: &str, transition_id: &str, fields: Option<Value>) -> RequestDescriptor {
    let mut body = json!({ "transition": { "id": transition_id } });
    if let Some(fields) = fields {
        body["fields"] = fields;
    }
    RequestDescriptor::post(format!("{}/transitions", issue_path(key))).json(body)
}

/// `adf_body` is an Atlassian Document Format document.
pub fn add_comment(key: &str, adf_body: Value) -> RequestDescriptor {
    RequestDescriptor::post(format!("{}/comment", issue_path(key))).json(json!({ "body": adf_body }))
}

/// `None` unassigns.
pub fn assign_issue(key: &str, account_id: Option<&str>) -> RequestDescriptor {
    RequestDescriptor::put(format!("{}/assignee", issue_path(key)))
        .json(json!({ "accountId": account_id }))
}

/// Minimal ADF document holding one paragraph of plain text.
pub fn text_to_adf(text: &str) -> Value {
    json!({
        "type": "doc",
        "version": 1,
        "content": [{
            "type": "paragraph",
            "content": [{ "type": "text", "text": text }]
        }]
    })
}
