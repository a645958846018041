use serde_json::Value;
use std::collections::HashSet;

use harvest_core::JobTarget;

use crate::api::{ControllerApi, CursorField, PageQuery};
use crate::error::Result;

/// Drain a listing by following the server-assigned cursor.
///
/// The cursor field is detected on the first non-empty page and kept for the
/// rest of the call; each later cursor is read from that field, falling back
/// to the alternate. Stops on an empty page, a non-positive cursor, or a
/// cursor the server already handed out.
pub async fn fetch_all_pages(
    api: &dyn ControllerApi,
    target: &JobTarget,
    query: &PageQuery,
) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    let mut cursor_field = CursorField::RsdScrollId;
    let mut detected = false;
    let mut cursor_id: i64 = 0;
    let mut followed = HashSet::from([cursor_id]);
    let mut calls = 0usize;

    loop {
        calls += 1;
        let page = match api.get_page(target, query, cursor_field, cursor_id).await? {
            Some(page) if !page.records.is_empty() => page,
            _ => break,
        };

        if !detected {
            if page.cursor(cursor_field).is_none() && page.cursor(cursor_field.alternate()).is_some() {
                cursor_field = cursor_field.alternate();
            }
            detected = true;
        }

        let next = page
            .cursor(cursor_field)
            .or_else(|| page.cursor(cursor_field.alternate()))
            .unwrap_or(0);
        records.extend(page.records);

        if next <= 0 {
            break;
        }
        if !followed.insert(next) {
            tracing::warn!(
                controller = target.controller_host(),
                application = %target.application_name,
                cursor = next,
                "controller handed out a cursor already followed, stopping"
            );
            break;
        }
        cursor_id = next;
    }

    tracing::debug!(
        controller = target.controller_host(),
        application = %target.application_name,
        records = records.len(),
        calls,
        cursor_field = cursor_field.name(),
        "listing drained"
    );
    Ok(records)
}
