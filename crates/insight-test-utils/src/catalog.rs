//! In-memory application and deployment catalogues.
//!
//! Both honour the listing contract the collectors rely on: every filter
//! must hold, orders are applied most significant first, and the cursor is
//! an opaque offset that is empty once the listing is exhausted. Every
//! request is recorded so tests can assert the filters a collector sent.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use insight_core::catalog::{
    Application, ApplicationLister, Deployment, DeploymentLister, FilterOperator, FilterValue,
    ListFilter, ListOptions, ListOrder, ListPage, OrderDirection, fields,
};
use insight_core::error::{Error, Result};

/// A catalogue item that exposes its fields to filters and orders.
pub trait CatalogRecord: Clone + Send + Sync + 'static {
    /// Returns the value of `field`, `None` if the field is unknown.
    fn field(&self, field: &str) -> Option<FilterValue>;
}

impl CatalogRecord for Application {
    fn field(&self, field: &str) -> Option<FilterValue> {
        match field {
            fields::ID => Some(FilterValue::Str(self.id.clone())),
            fields::CREATED_AT => Some(FilterValue::Int(self.created_at)),
            fields::DELETED => Some(FilterValue::Bool(self.deleted)),
            "ProjectId" => Some(FilterValue::Str(self.project_id.clone())),
            "Disabled" => Some(FilterValue::Bool(self.disabled)),
            _ => None,
        }
    }
}

impl CatalogRecord for Deployment {
    fn field(&self, field: &str) -> Option<FilterValue> {
        match field {
            fields::ID => Some(FilterValue::Str(self.id.clone())),
            fields::CREATED_AT => Some(FilterValue::Int(self.created_at)),
            fields::COMPLETED_AT => Some(FilterValue::Int(self.completed_at)),
            "ProjectId" => Some(FilterValue::Str(self.project_id.clone())),
            "ApplicationId" => Some(FilterValue::Str(self.application_id.clone())),
            _ => None,
        }
    }
}

fn compare(a: &FilterValue, b: &FilterValue) -> Option<Ordering> {
    match (a, b) {
        (FilterValue::Bool(x), FilterValue::Bool(y)) => Some(x.cmp(y)),
        (FilterValue::Int(x), FilterValue::Int(y)) => Some(x.cmp(y)),
        (FilterValue::Str(x), FilterValue::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches<T: CatalogRecord>(item: &T, filter: &ListFilter) -> Result<bool> {
    let actual = item
        .field(&filter.field)
        .ok_or_else(|| Error::catalog(format!("unknown filter field: {}", filter.field)))?;
    let ord = compare(&actual, &filter.value).ok_or_else(|| {
        Error::catalog(format!("filter value type mismatch on {}", filter.field))
    })?;
    Ok(match filter.operator {
        FilterOperator::Eq => ord == Ordering::Equal,
        FilterOperator::NotEq => ord != Ordering::Equal,
        FilterOperator::Gt => ord == Ordering::Greater,
        FilterOperator::Ge => ord != Ordering::Less,
        FilterOperator::Lt => ord == Ordering::Less,
        FilterOperator::Le => ord != Ordering::Greater,
    })
}

fn order<T: CatalogRecord>(a: &T, b: &T, orders: &[ListOrder]) -> Ordering {
    for key in orders {
        let ord = match (a.field(&key.field), b.field(&key.field)) {
            (Some(x), Some(y)) => compare(&x, &y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        let ord = match key.direction {
            OrderDirection::Asc => ord,
            OrderDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Generic in-memory catalogue.
#[derive(Debug)]
pub struct MemoryCatalog<T> {
    items: Arc<Mutex<Vec<T>>>,
    requests: Arc<Mutex<Vec<ListOptions>>>,
    /// Fail the listing call with this 0-based index (and every later one).
    fail_from_call: Arc<Mutex<Option<usize>>>,
}

impl<T> Clone for MemoryCatalog<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            requests: Arc::clone(&self.requests),
            fail_from_call: Arc::clone(&self.fail_from_call),
        }
    }
}

impl<T> Default for MemoryCatalog<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            fail_from_call: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: CatalogRecord> MemoryCatalog<T> {
    /// Creates a catalogue holding `items`.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let catalog = Self::default();
        catalog.items.lock().expect("lock").extend(items);
        catalog
    }

    /// Adds an item.
    pub fn push(&self, item: T) {
        self.items.lock().expect("lock").push(item);
    }

    /// Replaces every item.
    pub fn replace(&self, items: impl IntoIterator<Item = T>) {
        let mut guard = self.items.lock().expect("lock");
        guard.clear();
        guard.extend(items);
    }

    /// Returns the recorded listing requests.
    pub fn requests(&self) -> Vec<ListOptions> {
        self.requests.lock().expect("lock").clone()
    }

    /// Makes every listing call fail.
    pub fn fail_always(&self) {
        self.fail_from_call(0);
    }

    /// Makes listing call `index` (0-based) and every later call fail.
    pub fn fail_from_call(&self, index: usize) {
        *self.fail_from_call.lock().expect("lock") = Some(index);
    }

    /// Clears injected failures.
    pub fn clear_failures(&self) {
        *self.fail_from_call.lock().expect("lock") = None;
    }

    fn list(&self, options: &ListOptions) -> Result<ListPage<T>> {
        let call = {
            let mut requests = self.requests.lock().expect("lock");
            requests.push(options.clone());
            requests.len() - 1
        };
        if let Some(from) = *self.fail_from_call.lock().expect("lock") {
            if call >= from {
                return Err(Error::catalog(format!("injected failure on call {call}")));
            }
        }
        if options.limit == 0 {
            return Err(Error::catalog("limit must be greater than 0"));
        }

        let offset = if options.cursor.is_empty() {
            0
        } else {
            options
                .cursor
                .parse::<usize>()
                .map_err(|_| Error::catalog(format!("malformed cursor: {}", options.cursor)))?
        };

        let mut selected = Vec::new();
        for item in self.items.lock().expect("lock").iter() {
            let mut keep = true;
            for filter in &options.filters {
                keep &= matches(item, filter)?;
            }
            if keep {
                selected.push(item.clone());
            }
        }
        selected.sort_by(|a, b| order(a, b, &options.orders));

        let end = (offset + options.limit).min(selected.len());
        let items = selected.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
        let cursor = if end < selected.len() {
            end.to_string()
        } else {
            String::new()
        };
        Ok(ListPage { items, cursor })
    }
}

/// In-memory application catalogue.
pub type MemoryApplicationCatalog = MemoryCatalog<Application>;

/// In-memory deployment catalogue.
pub type MemoryDeploymentCatalog = MemoryCatalog<Deployment>;

#[async_trait]
impl ApplicationLister for MemoryCatalog<Application> {
    async fn list_applications(&self, options: &ListOptions) -> Result<ListPage<Application>> {
        self.list(options)
    }
}

#[async_trait]
impl DeploymentLister for MemoryCatalog<Deployment> {
    async fn list_deployments(&self, options: &ListOptions) -> Result<ListPage<Deployment>> {
        self.list(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ApplicationFactory, DeploymentFactory};
    use insight_core::model::ApplicationKind;

    #[tokio::test]
    async fn pages_follow_cursor_until_empty() {
        let catalog = MemoryApplicationCatalog::new(
            (0..5).map(|i| ApplicationFactory::new(format!("a{i}"), "p1").created_at(i).build()),
        );
        let mut options = ListOptions {
            orders: vec![ListOrder::asc(fields::CREATED_AT)],
            limit: 2,
            ..ListOptions::default()
        };

        let mut seen = Vec::new();
        loop {
            let page = catalog.list_applications(&options).await.unwrap();
            seen.extend(page.items.into_iter().map(|a| a.id));
            if page.cursor.is_empty() {
                break;
            }
            options.cursor = page.cursor;
        }
        assert_eq!(seen, vec!["a0", "a1", "a2", "a3", "a4"]);
        assert_eq!(catalog.requests().len(), 3);
    }

    #[tokio::test]
    async fn filters_must_all_hold() {
        let catalog = MemoryDeploymentCatalog::new([
            DeploymentFactory::new("d1", "app", "p1").completed_at(100).build(),
            DeploymentFactory::new("d2", "app", "p1").completed_at(200).build(),
            DeploymentFactory::new("d3", "app", "p1").completed_at(300).build(),
        ]);
        let options = ListOptions {
            filters: vec![
                ListFilter::new(fields::COMPLETED_AT, FilterOperator::Ge, FilterValue::Int(150)),
                ListFilter::new(fields::COMPLETED_AT, FilterOperator::Le, FilterValue::Int(300)),
            ],
            limit: 10,
            ..ListOptions::default()
        };
        let page = catalog.list_deployments(&options).await.unwrap();
        let ids: Vec<_> = page.items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d2", "d3"]);
        assert!(page.cursor.is_empty());
    }

    #[tokio::test]
    async fn injected_failure_applies_from_given_call() {
        let catalog = MemoryApplicationCatalog::new([ApplicationFactory::new("a1", "p1")
            .kind(ApplicationKind::Ecs)
            .build()]);
        catalog.fail_from_call(1);
        let options = ListOptions {
            limit: 1,
            ..ListOptions::default()
        };
        assert!(catalog.list_applications(&options).await.is_ok());
        let err = catalog.list_applications(&options).await.unwrap_err();
        assert!(matches!(err, Error::Catalog { .. }));
    }
}
