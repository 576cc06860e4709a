use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::config::{LCD_PAGE_LIMIT, MAX_PAGES};
use crate::error::{FetchError, PayloadError};
use crate::fetcher::{with_query, Fetcher};
use crate::transport::envelope::pointer;

/// Collect every record of a cursor-paginated LCD listing.
///
/// Follows `pagination.next_key` until it is null or empty. A cursor seen twice,
/// or more than [`MAX_PAGES`] pages, is a payload error rather than a silently
/// truncated list.
pub async fn drain_pages(
    fetcher: &Fetcher,
    base_url: &str,
    list_key: &'static str,
) -> Result<Vec<Value>, FetchError> {
    drain_pages_with(fetcher, base_url, list_key, LCD_PAGE_LIMIT, MAX_PAGES).await
}

pub async fn drain_pages_with(
    fetcher: &Fetcher,
    base_url: &str,
    list_key: &'static str,
    page_limit: u32,
    max_pages: usize,
) -> Result<Vec<Value>, FetchError> {
    let limit = page_limit.to_string();
    let mut records = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut next_key: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if pages >= max_pages {
            let msg = format!("{base_url}: more than {max_pages} pages");
            return Err(PayloadError::Pagination(msg).into());
        }

        let mut params = vec![("pagination.limit", limit.as_str())];
        if let Some(key) = next_key.as_deref() {
            params.push(("pagination.key", key));
        }
        let url = with_query(base_url, &params)?;
        let mut payload = fetcher.get(&url).await?;
        pages += 1;

        let page = match payload.get_mut(list_key).map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Err(PayloadError::MissingField(list_key).into()),
            Some(other) => {
                return Err(PayloadError::InvalidValue {
                    field: list_key,
                    value: type_name(&other).to_string(),
                }
                .into())
            }
        };
        debug!(url = %base_url, page = pages, count = page.len(), "Fetched page");
        records.extend(page);

        next_key = pointer(&payload, &["pagination", "next_key"])
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        match &next_key {
            None => break,
            Some(key) if !seen_keys.insert(key.clone()) => {
                let msg = format!("{base_url}: cursor {key} repeated");
                return Err(PayloadError::Pagination(msg).into());
            }
            Some(_) => {}
        }
    }

    Ok(records)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
