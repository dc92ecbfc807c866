//! Graph response fixtures

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

/// A chat message in Graph wire shape
pub fn message(id: &str, created: DateTime<Utc>, reply_to: Option<&str>) -> Value {
    json!({
        "id": id,
        "replyToId": reply_to,
        "etag": id,
        "createdDateTime": created.to_rfc3339(),
        "lastModifiedDateTime": null,
        "deletedDateTime": null,
        "subject": null,
        "importance": "normal",
        "locale": "en-us",
        "from": {
            "application": null,
            "device": null,
            "user": { "id": "u-1", "displayName": "Adele Vance", "userIdentityType": "aadUser" }
        },
        "body": { "contentType": "text", "content": format!("message {id}") },
        "attachments": [],
        "mentions": [],
        "reactions": []
    })
}

/// A message collection page
pub fn page(messages: Vec<Value>, next_link: Option<String>) -> Value {
    match next_link {
        Some(link) => json!({ "@odata.nextLink": link, "value": messages }),
        None => json!({ "value": messages }),
    }
}

/// A drive item as returned by upload endpoints
pub fn drive_item(id: &str, unique_id: &str) -> Value {
    json!({
        "id": id,
        "name": "report",
        "webUrl": format!("https://contoso-my.sharepoint.com/personal/adele/Documents/{id}"),
        "eTag": format!("\"{{{unique_id}}},1\""),
        "file": { "mimeType": "text/plain" },
        "@microsoft.graph.downloadUrl": format!(
            "https://contoso-my.sharepoint.com/personal/adele/_layouts/15/download.aspx?UniqueId={unique_id}&Translate=false&tempauth=abc"
        )
    })
}
