use std::collections::{BTreeMap, BTreeSet, HashSet};

use mongex_common::error::{MongexError, Result};
use tracing::warn;

use crate::client::{AdminClient, CollectionFilter, DatabaseFilter};

pub const SYSTEM_DATABASES: [&str; 3] = ["admin", "config", "local"];

pub fn split_namespace(ns: &str) -> (String, String) {
    match ns.split_once('.') {
        Some((database, collection)) => (database.to_string(), collection.to_string()),
        None => (ns.to_string(), String::new()),
    }
}

pub fn system_databases() -> Vec<String> {
    SYSTEM_DATABASES.iter().map(|name| name.to_string()).collect()
}

pub async fn list_databases(
    client: &dyn AdminClient,
    filter_namespaces: &[String],
    exclude: &[String],
) -> Result<Vec<String>> {
    let filter = DatabaseFilter {
        exclude: remove_empty_strings(exclude),
        include: remove_empty_strings(filter_namespaces)
            .iter()
            .map(|namespace| split_namespace(namespace).0)
            .filter(|database| !database.is_empty())
            .collect(),
    };

    client.list_database_names(&filter).await
}

pub async fn list_collections(
    client: &dyn AdminClient,
    database: &str,
    filter_namespaces: &[String],
) -> Result<Vec<String>> {
    let patterns = remove_empty_strings(filter_namespaces)
        .iter()
        .map(|namespace| split_namespace(namespace).1)
        .filter(|collection| !collection.is_empty())
        .collect::<Vec<_>>();
    let filter = CollectionFilter::with_patterns(patterns)?;

    client.list_collection_names(database, &filter).await
}

pub async fn list_all_collections(
    client: &dyn AdminClient,
    filter_namespaces: &[String],
    exclude_databases: &[String],
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let databases = list_databases(client, filter_namespaces, exclude_databases).await?;

    let mut filters = remove_empty_strings(filter_namespaces);
    if filters.is_empty() {
        filters = databases.clone();
    }

    let mut namespaces: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for database in &databases {
        for namespace in &filters {
            let (filter_database, _) = split_namespace(namespace);
            let filter_database = filter_database.trim();
            if filter_database.is_empty() || !filter_database.eq_ignore_ascii_case(database) {
                continue;
            }

            let collections = list_collections(client, database, std::slice::from_ref(namespace))
                .await
                .map_err(|err| match err {
                    MongexError::Command { command, code, message } => MongexError::Command {
                        command,
                        code,
                        message: format!("cannot list the collections for {database:?}: {message}"),
                    },
                    other => other,
                })?;

            namespaces
                .entry(database.clone())
                .or_default()
                .extend(collections);
        }
    }

    Ok(namespaces)
}

pub async fn filter_views_out(
    client: &dyn AdminClient,
    candidates: &[String],
) -> Result<Vec<String>> {
    let physical = physical_namespaces(client).await?;

    let mut filtered = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !physical.contains(candidate) {
            return Err(MongexError::InvalidNamespaceKind(candidate.clone()));
        }
        filtered.push(candidate.clone());
    }

    Ok(filtered)
}

pub async fn non_system_collections_count(
    client: &dyn AdminClient,
    include_namespaces: &[String],
    filter_collections: &[String],
) -> Result<usize> {
    let databases = list_databases(client, include_namespaces, &system_databases()).await?;

    let mut count = 0;
    for database in &databases {
        count += list_collections(client, database, filter_collections)
            .await?
            .len();
    }

    Ok(count)
}

/// Namespaces for the collstats/indexstats collectors. Discovering mode
/// expands database-only entries and quietly drops views; otherwise the
/// entries are taken literally and a view is an error.
pub async fn resolve_stats_namespaces(
    client: &dyn AdminClient,
    namespaces: &[String],
    discovering: bool,
) -> Result<Vec<String>> {
    if discovering {
        let physical = physical_namespaces(client).await?;
        let discovered = list_all_collections(client, namespaces, &system_databases()).await?;
        return Ok(discovered
            .into_iter()
            .flat_map(|(database, collections)| {
                collections
                    .into_iter()
                    .map(move |collection| format!("{database}.{collection}"))
            })
            .filter(|namespace| physical.contains(namespace))
            .collect());
    }

    let mut candidates = Vec::with_capacity(namespaces.len());
    for namespace in remove_empty_strings(namespaces) {
        if split_namespace(&namespace).1.is_empty() {
            warn!(
                namespace = %namespace,
                "namespace names only a database, enable discovering mode to expand it"
            );
            continue;
        }
        candidates.push(namespace);
    }

    filter_views_out(client, &candidates).await
}

pub async fn physical_namespaces(client: &dyn AdminClient) -> Result<HashSet<String>> {
    let databases = list_databases(client, &[], &[]).await?;
    let filter = CollectionFilter::physical_only();

    let mut namespaces = HashSet::new();
    for database in databases.iter().filter(|database| !database.is_empty()) {
        for collection in client.list_collection_names(database, &filter).await? {
            namespaces.insert(format!("{database}.{collection}"));
        }
    }

    Ok(namespaces)
}

fn remove_empty_strings(items: &[String]) -> Vec<String> {
    items
        .iter()
        .filter(|item| !item.is_empty())
        .cloned()
        .collect()
}
