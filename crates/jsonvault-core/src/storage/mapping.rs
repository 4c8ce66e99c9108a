use serde_json::{
    map::{Iter, Keys, Values},
    Map, Value,
};

use super::StoreError;

/// Ordered JSON object held by a store (insertion order is preserved).
pub type Object = Map<String, Value>;

/// Mapping operations a store exposes by forwarding to the object it owns.
///
/// Implementors only provide access to the owned object; every operation is a
/// default method that forwards to it. Accessors fail with
/// [`StoreError::NotLoaded`] while nothing has been loaded. None of these calls
/// touch the disk.
pub trait Mapping {
    /// Borrow the owned object.
    fn mapping(&self) -> Result<&Object, StoreError>;

    /// Mutably borrow the owned object.
    fn mapping_mut(&mut self) -> Result<&mut Object, StoreError>;

    fn contains_key(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.mapping()?.contains_key(key))
    }

    /// Indexed lookup; an absent key is an error.
    fn get_item(&self, key: &str) -> Result<&Value, StoreError> {
        self.mapping()?.get(key).ok_or_else(|| missing(key))
    }

    /// Insert or overwrite. Overwriting keeps the key's position.
    fn set_item(&mut self, key: impl Into<String>, value: Value) -> Result<(), StoreError> {
        self.mapping_mut()?.insert(key.into(), value);
        Ok(())
    }

    /// Indexed delete; an absent key is an error.
    fn delete_item(&mut self, key: &str) -> Result<(), StoreError> {
        self.mapping_mut()?
            .shift_remove(key)
            .map(|_| ())
            .ok_or_else(|| missing(key))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.mapping_mut()?.clear();
        Ok(())
    }

    /// Detached copy of the current contents.
    fn copy(&self) -> Result<Object, StoreError> {
        Ok(self.mapping()?.clone())
    }

    /// New object with every key mapped to a clone of `value`.
    fn from_keys<I, K>(keys: I, value: Value) -> Object
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        keys.into_iter()
            .map(|key| (key.into(), value.clone()))
            .collect()
    }

    fn get(&self, key: &str) -> Result<Option<&Value>, StoreError> {
        Ok(self.mapping()?.get(key))
    }

    /// Lookup returning `default` when the key is absent.
    fn get_or(&self, key: &str, default: Value) -> Result<Value, StoreError> {
        Ok(self.mapping()?.get(key).cloned().unwrap_or(default))
    }

    fn items(&self) -> Result<Iter<'_>, StoreError> {
        Ok(self.mapping()?.iter())
    }

    fn keys(&self) -> Result<Keys<'_>, StoreError> {
        Ok(self.mapping()?.keys())
    }

    fn values(&self) -> Result<Values<'_>, StoreError> {
        Ok(self.mapping()?.values())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.mapping()?.len())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.mapping()?.is_empty())
    }

    /// Remove and return the value for `key`; an absent key is an error.
    fn pop(&mut self, key: &str) -> Result<Value, StoreError> {
        self.mapping_mut()?
            .shift_remove(key)
            .ok_or_else(|| missing(key))
    }

    fn pop_or(&mut self, key: &str, default: Value) -> Result<Value, StoreError> {
        Ok(self.mapping_mut()?.shift_remove(key).unwrap_or(default))
    }

    /// Remove and return the most recently inserted entry.
    fn pop_item(&mut self) -> Result<(String, Value), StoreError> {
        let map = self.mapping_mut()?;
        let key = map
            .keys()
            .next_back()
            .cloned()
            .ok_or(StoreError::EmptyMapping)?;
        map.shift_remove_entry(&key).ok_or(StoreError::EmptyMapping)
    }

    /// Insert `default` if `key` is absent, then return the stored value.
    fn set_default(
        &mut self,
        key: impl Into<String>,
        default: Value,
    ) -> Result<&mut Value, StoreError> {
        Ok(self.mapping_mut()?.entry(key.into()).or_insert(default))
    }

    /// Bulk insert; existing keys are overwritten in place.
    fn update<I>(&mut self, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.mapping_mut()?.extend(entries);
        Ok(())
    }
}

fn missing(key: &str) -> StoreError {
    StoreError::KeyMissing {
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Holder {
        inner: Option<Object>,
    }

    impl Holder {
        fn loaded(value: Value) -> Self {
            match value {
                Value::Object(map) => Self { inner: Some(map) },
                other => panic!("expected object, got {other}"),
            }
        }
    }

    impl Mapping for Holder {
        fn mapping(&self) -> Result<&Object, StoreError> {
            self.inner.as_ref().ok_or(StoreError::NotLoaded)
        }

        fn mapping_mut(&mut self) -> Result<&mut Object, StoreError> {
            self.inner.as_mut().ok_or(StoreError::NotLoaded)
        }
    }

    fn key_list(holder: &Holder) -> Vec<String> {
        holder.keys().expect("keys").cloned().collect()
    }

    #[test]
    fn unloaded_holder_rejects_every_operation() {
        let mut holder = Holder::default();
        assert_eq!(holder.contains_key("a"), Err(StoreError::NotLoaded));
        assert_eq!(holder.get_item("a").unwrap_err(), StoreError::NotLoaded);
        assert_eq!(holder.set_item("a", json!(1)), Err(StoreError::NotLoaded));
        assert_eq!(holder.clear(), Err(StoreError::NotLoaded));
        assert_eq!(holder.pop_item(), Err(StoreError::NotLoaded));
    }

    #[test]
    fn indexed_access_reports_missing_keys() {
        let mut holder = Holder::loaded(json!({"a": 1}));
        assert_eq!(holder.get_item("a").expect("present"), &json!(1));
        assert_eq!(
            holder.get_item("b").unwrap_err(),
            StoreError::KeyMissing { key: "b".into() }
        );
        assert_eq!(
            holder.delete_item("b"),
            Err(StoreError::KeyMissing { key: "b".into() })
        );
        holder.delete_item("a").expect("delete");
        assert!(!holder.contains_key("a").expect("contains"));
    }

    #[test]
    fn removal_keeps_remaining_order() {
        let mut holder = Holder::loaded(json!({"a": 1, "b": 2, "c": 3, "d": 4}));
        holder.delete_item("b").expect("delete");
        assert_eq!(holder.pop("a").expect("pop"), json!(1));
        assert_eq!(key_list(&holder), vec!["c", "d"]);
    }

    #[test]
    fn pop_item_is_last_in_first_out() {
        let mut holder = Holder::loaded(json!({}));
        holder.set_item("first", json!(1)).expect("set");
        holder.set_item("second", json!(2)).expect("set");

        assert_eq!(
            holder.pop_item().expect("pop"),
            ("second".to_string(), json!(2))
        );
        assert_eq!(
            holder.pop_item().expect("pop"),
            ("first".to_string(), json!(1))
        );
        assert_eq!(holder.pop_item(), Err(StoreError::EmptyMapping));
    }

    #[test]
    fn pop_or_and_get_or_fall_back_to_default() {
        let mut holder = Holder::loaded(json!({"a": 1}));
        assert_eq!(holder.get_or("z", json!("dflt")).expect("get_or"), json!("dflt"));
        assert_eq!(holder.pop_or("z", json!(null)).expect("pop_or"), json!(null));
        assert_eq!(holder.pop_or("a", json!(null)).expect("pop_or"), json!(1));
        assert_eq!(holder.get("a").expect("get"), None);
    }

    #[test]
    fn set_default_only_fills_absent_keys() {
        let mut holder = Holder::loaded(json!({"a": 1}));
        assert_eq!(*holder.set_default("a", json!(9)).expect("existing"), json!(1));
        *holder.set_default("b", json!([])).expect("absent") = json!([1]);
        assert_eq!(holder.get_item("b").expect("b"), &json!([1]));
    }

    #[test]
    fn update_overwrites_in_place_and_appends_new_keys() {
        let mut holder = Holder::loaded(json!({"a": 1, "b": 2}));
        holder
            .update([("a".to_string(), json!(10)), ("c".to_string(), json!(3))])
            .expect("update");
        assert_eq!(key_list(&holder), vec!["a", "b", "c"]);
        assert_eq!(holder.get_item("a").expect("a"), &json!(10));
    }

    #[test]
    fn from_keys_fills_every_key() {
        let built = Holder::from_keys(["x", "y"], json!(0));
        assert_eq!(Value::Object(built), json!({"x": 0, "y": 0}));
    }

    #[test]
    fn copy_is_detached() {
        let mut holder = Holder::loaded(json!({"a": {"n": 1}}));
        let snapshot = holder.copy().expect("copy");
        holder.set_item("a", json!({"n": 2})).expect("set");
        assert_eq!(snapshot["a"], json!({"n": 1}));
    }

    #[test]
    fn enumeration_matches_insertion_order() {
        let holder = Holder::loaded(json!({"z": 1, "a": 2}));
        let items: Vec<_> = holder
            .items()
            .expect("items")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(
            items,
            vec![("z".to_string(), json!(1)), ("a".to_string(), json!(2))]
        );
        let values: Vec<_> = holder.values().expect("values").cloned().collect();
        assert_eq!(values, vec![json!(1), json!(2)]);
        assert_eq!(holder.len().expect("len"), 2);
        assert!(!holder.is_empty().expect("is_empty"));
    }
}
