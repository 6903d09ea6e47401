//! Query evaluation over an ordered in-memory table.
//!
//! Table queries walk the partition in sort-key order. Index queries collect
//! the items carrying the index hash attribute and order them by
//! `(range value, primary key)`, which is also what a continuation token
//! records so a later page can resume even if the last item was deleted.

use std::collections::BTreeMap;
use std::ops::Bound;

use grantstore_storage::{
    ContinuationToken, IndexSchema, Item, PrimaryKey, QueryPage, QueryRequest, StorageError,
    TableSchema, string_attribute,
};

/// Items eligible for a query, in evaluation order, with their index position.
type Candidates<'a> = Vec<(String, &'a PrimaryKey, &'a Item)>;

pub(crate) fn run_query(
    schema: &TableSchema,
    data: &BTreeMap<PrimaryKey, Item>,
    request: &QueryRequest,
    page_size: usize,
    is_live: impl Fn(&Item) -> bool,
) -> Result<QueryPage, StorageError> {
    let candidates = match &request.index {
        None => table_candidates(schema, data, request, &is_live),
        Some(name) => {
            let index = schema.index(name).ok_or_else(|| {
                StorageError::invalid_request(format!(
                    "table {} has no index named {name}",
                    schema.name
                ))
            })?;
            index_candidates(index, data, request, &is_live)?
        }
    };

    let limit = request.limit.unwrap_or(page_size).clamp(1, page_size);
    let mut page = QueryPage::default();
    let mut evaluated = 0usize;
    let mut last: Option<(&String, &PrimaryKey)> = None;

    for (position, key, item) in &candidates {
        if evaluated == limit {
            break;
        }
        evaluated += 1;
        last = Some((position, *key));
        if request.filter.as_ref().is_none_or(|filter| filter.matches(item)) {
            page.items.push((*item).clone());
        }
    }

    if evaluated < candidates.len()
        && let Some((position, key)) = last
    {
        let token = ContinuationToken::after(key.clone());
        page.next = Some(match request.index {
            Some(_) => token.with_index_position(position.clone()),
            None => token,
        });
    }

    Ok(page)
}

fn table_candidates<'a>(
    schema: &TableSchema,
    data: &'a BTreeMap<PrimaryKey, Item>,
    request: &QueryRequest,
    is_live: &impl Fn(&Item) -> bool,
) -> Candidates<'a> {
    let partition = request.key.hash_value.as_str();
    let lower = match &request.start {
        Some(start) if start.key().partition_key == partition => {
            Bound::Excluded(start.key().clone())
        }
        _ => Bound::Included(PrimaryKey::new(partition, "")),
    };

    data.range((lower, Bound::Unbounded))
        .take_while(|(key, _)| key.partition_key == partition)
        .filter(|(key, _)| {
            request
                .key
                .range
                .as_ref()
                .is_none_or(|range| range.matches(&key.sort_key))
        })
        .filter(|(_, item)| is_live(*item))
        .map(|(key, item)| {
            let position = string_attribute(item, &schema.sort_key_attribute)
                .unwrap_or_default()
                .to_string();
            (position, key, item)
        })
        .collect()
}

fn index_candidates<'a>(
    index: &IndexSchema,
    data: &'a BTreeMap<PrimaryKey, Item>,
    request: &QueryRequest,
    is_live: &impl Fn(&Item) -> bool,
) -> Result<Candidates<'a>, StorageError> {
    if request.key.range.is_some() && index.range_attribute.is_none() {
        return Err(StorageError::invalid_request(format!(
            "index {} has no range attribute",
            index.name
        )));
    }

    let mut candidates: Candidates<'a> = data
        .iter()
        .filter(|(_, item)| {
            string_attribute(item, &index.hash_attribute) == Some(request.key.hash_value.as_str())
        })
        .filter(|(_, item)| is_live(*item))
        .filter_map(|(key, item)| {
            let position = match &index.range_attribute {
                Some(attribute) => string_attribute(item, attribute)?.to_string(),
                None => String::new(),
            };
            if let Some(range) = &request.key.range
                && !range.matches(&position)
            {
                return None;
            }
            Some((position, key, item))
        })
        .collect();

    candidates.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

    if let Some(start) = &request.start {
        let resume_at = (start.index_position().unwrap_or_default(), start.key());
        candidates.retain(|(position, key, _)| (position.as_str(), *key) > resume_at);
    }

    Ok(candidates)
}
