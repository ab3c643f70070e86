use std::collections::HashMap;

use nav_rs::Ekf23d;

use crate::error::{JResult, NavBindingError};

/// Filters owned by the binding shell, keyed by the handle handed to Java
///
/// Handles start at 1 and are never reused within a process, so a stale
/// handle from a released filter cannot reach a newer one.
pub struct FilterRegistry {
    next_handle: i64,
    filters: HashMap<i64, Ekf23d>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            filters: HashMap::new(),
        }
    }

    /// Take ownership of `filter` and return its handle
    pub fn create(&mut self, filter: Ekf23d) -> i64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.filters.insert(handle, filter);
        handle
    }

    /// Drop the filter behind `previous`, if any, and register `filter`
    /// under a fresh handle
    pub fn replace(&mut self, previous: i64, filter: Ekf23d) -> i64 {
        if self.filters.remove(&previous).is_some() {
            log::debug!("Filter {} discarded on re-initialization", previous);
        }
        self.create(filter)
    }

    pub fn release(&mut self, handle: i64) -> JResult<()> {
        self.filters
            .remove(&handle)
            .map(|_| ())
            .ok_or(NavBindingError::Uninitialized(handle))
    }

    /// Run `op` against the filter behind `handle`
    pub fn with_filter<T>(
        &mut self,
        handle: i64,
        op: impl FnOnce(&mut Ekf23d) -> T,
    ) -> JResult<T> {
        let filter = self
            .filters
            .get_mut(&handle)
            .ok_or(NavBindingError::Uninitialized(handle))?;
        Ok(op(filter))
    }

    pub fn contains(&self, handle: i64) -> bool {
        self.filters.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nav_rs::Lla;

    fn filter() -> Ekf23d {
        Ekf23d::with_defaults(0.0, Lla::new(0.0, 0.0, 0.0))
    }

    #[test]
    fn test_registry_lifecycle() {
        let mut registry = FilterRegistry::new();
        assert!(registry.is_empty());

        let a = registry.create(filter());
        let b = registry.create(filter());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.release(a).unwrap();
        assert!(!registry.contains(a));
        assert!(registry.contains(b));
        assert!(matches!(
            registry.release(a),
            Err(NavBindingError::Uninitialized(h)) if h == a
        ));
    }

    #[test]
    fn test_handles_not_reused() {
        let mut registry = FilterRegistry::new();
        let a = registry.create(filter());
        registry.release(a).unwrap();
        let b = registry.create(filter());
        assert!(b > a);
    }

    #[test]
    fn test_replace_discards_previous() {
        let mut registry = FilterRegistry::new();
        let a = registry.create(filter());
        let b = registry.replace(a, filter());

        assert_ne!(a, b);
        assert!(!registry.contains(a));
        assert!(registry.contains(b));
        assert_eq!(registry.len(), 1);

        // Unknown previous handle: plain create
        let c = registry.replace(0, filter());
        assert!(registry.contains(c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_with_filter_routes_to_instance() {
        let mut registry = FilterRegistry::new();
        let a = registry.create(filter());
        let b = registry.create(filter());

        registry
            .with_filter(a, |ekf| ekf.propagate_to(2.0))
            .unwrap()
            .unwrap();

        assert_eq!(registry.with_filter(a, |ekf| ekf.time()).unwrap(), 2.0);
        assert_eq!(registry.with_filter(b, |ekf| ekf.time()).unwrap(), 0.0);
        assert!(registry.with_filter(99, |ekf| ekf.time()).is_err());
    }
}
