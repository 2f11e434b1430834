//! Ordered collections addressed by stable element identity.
//!
//! UI lists need two access paths at once: *position* (rendering, swipe
//! actions addressed by index) and *identity* (routing an action to the row
//! that triggered it, even after siblings were inserted or removed). A plain
//! `Vec` gives only the first; a `HashMap` only the second.
//!
//! [`IdentifiedArray`] gives both: insertion order is preserved, lookup by id
//! is O(1) amortized, and every element promises a stable id via
//! [`Identifiable`].
//!
//! # Example
//!
//! ```ignore
//! use ratchet::{Identifiable, IdentifiedArray};
//! use uuid::Uuid;
//!
//! #[derive(Clone)]
//! struct Todo {
//!     id: Uuid,
//!     description: String,
//! }
//!
//! impl Identifiable for Todo {
//!     type Id = Uuid;
//!     fn id(&self) -> Uuid {
//!         self.id
//!     }
//! }
//!
//! let mut todos = IdentifiedArray::new();
//! todos.push(Todo { id: Uuid::new_v4(), description: "milk".into() });
//! let first_id = todos[0].id;
//! todos.get_mut(&first_id).unwrap().description = "oat milk".into();
//! ```

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::Index;

use indexmap::IndexMap;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A value with a stable identity independent of its storage position.
///
/// The id must not change while the value lives inside an
/// [`IdentifiedArray`]; mutating it through `get_mut`/`iter_mut` desynchronizes
/// the lookup index.
pub trait Identifiable {
    /// The identity type elements carry.
    type Id: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;

    /// The element's stable identity.
    fn id(&self) -> Self::Id;
}

/// Ordered collection of [`Identifiable`] elements with O(1) amortized id
/// lookup.
///
/// Positional operations use `_at` names (`get_at`, `remove_at`, `insert_at`)
/// and follow `Vec` panicking conventions; id-based operations return
/// `Option`.
#[derive(Clone)]
pub struct IdentifiedArray<T: Identifiable> {
    map: IndexMap<T::Id, T>,
}

impl<T: Identifiable> IdentifiedArray<T> {
    /// An empty collection.
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    /// An empty collection with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: IndexMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Appends an element.
    ///
    /// # Panics
    ///
    /// Panics if an element with the same id is already present. Use
    /// [`try_push`](Self::try_push) when the id may collide.
    pub fn push(&mut self, element: T) {
        if let Err(element) = self.try_push(element) {
            panic!(
                "duplicate id {:?} pushed into IdentifiedArray",
                element.id()
            );
        }
    }

    /// Appends an element, handing it back if its id is already present.
    pub fn try_push(&mut self, element: T) -> Result<(), T> {
        let id = element.id();
        if self.map.contains_key(&id) {
            return Err(element);
        }
        self.map.insert(id, element);
        Ok(())
    }

    /// Inserts an element at `index`, shifting later elements toward the back.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`, or if an element with the same id is already
    /// present.
    pub fn insert_at(&mut self, index: usize, element: T) {
        let id = element.id();
        assert!(
            !self.map.contains_key(&id),
            "duplicate id {:?} inserted into IdentifiedArray",
            id
        );
        self.map.shift_insert(index, id, element);
    }

    /// Removes and returns the element with `id`, preserving the order of the
    /// rest. Returns `None` when no such element exists.
    pub fn remove(&mut self, id: &T::Id) -> Option<T> {
        self.map.shift_remove(id)
    }

    /// Removes and returns the element at `index`, preserving the order of
    /// the rest.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove_at(&mut self, index: usize) -> T {
        match self.map.shift_remove_index(index) {
            Some((_, element)) => element,
            None => panic!(
                "remove_at index {} out of bounds for IdentifiedArray of length {}",
                index,
                self.map.len()
            ),
        }
    }

    /// Moves the element at `from` to `to`, shifting everything in between.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn move_at(&mut self, from: usize, to: usize) {
        self.map.move_index(from, to);
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.map.contains_key(id)
    }

    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.map.get(id)
    }

    pub fn get_mut(&mut self, id: &T::Id) -> Option<&mut T> {
        self.map.get_mut(id)
    }

    pub fn get_at(&self, index: usize) -> Option<&T> {
        self.map.get_index(index).map(|(_, element)| element)
    }

    pub fn get_at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.map.get_index_mut(index).map(|(_, element)| element)
    }

    /// The position of `id`, if present.
    pub fn index_of(&self, id: &T::Id) -> Option<usize> {
        self.map.get_index_of(id)
    }

    pub fn first(&self) -> Option<&T> {
        self.get_at(0)
    }

    pub fn last(&self) -> Option<&T> {
        self.map.last().map(|(_, element)| element)
    }

    /// Element ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &T::Id> {
        self.map.keys()
    }

    /// Elements in order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.map.values()
    }

    /// Mutable elements in order. Ids must not be mutated through this.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.map.values_mut()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<T: Identifiable> Default for IdentifiedArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Identifiable + fmt::Debug> fmt::Debug for IdentifiedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.map.values()).finish()
    }
}

// Order-sensitive equality: IndexMap's own PartialEq ignores order, which is
// wrong for a collection whose order is state.
impl<T: Identifiable + PartialEq> PartialEq for IdentifiedArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.map.len() == other.map.len() && self.map.iter().eq(other.map.iter())
    }
}

impl<T: Identifiable + Eq> Eq for IdentifiedArray<T> {}

/// # Panics
///
/// Panics if two elements share an id.
impl<T: Identifiable> FromIterator<T> for IdentifiedArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::new();
        for element in iter {
            array.push(element);
        }
        array
    }
}

impl<T: Identifiable> IntoIterator for IdentifiedArray<T> {
    type Item = T;
    type IntoIter = indexmap::map::IntoValues<T::Id, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.into_values()
    }
}

impl<'a, T: Identifiable> IntoIterator for &'a IdentifiedArray<T> {
    type Item = &'a T;
    type IntoIter = indexmap::map::Values<'a, T::Id, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.values()
    }
}

impl<T: Identifiable> Index<usize> for IdentifiedArray<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get_at(index) {
            Some(element) => element,
            None => panic!(
                "index {} out of bounds for IdentifiedArray of length {}",
                index,
                self.len()
            ),
        }
    }
}

// Serialized as a plain sequence of elements; ids are recomputed from the
// elements on the way back in.
impl<T> Serialize for IdentifiedArray<T>
where
    T: Identifiable + Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for element in self.iter() {
            seq.serialize_element(element)?;
        }
        seq.end()
    }
}

impl<'de, T> Deserialize<'de> for IdentifiedArray<T>
where
    T: Identifiable + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeqVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for SeqVisitor<T>
        where
            T: Identifiable + Deserialize<'de>,
        {
            type Value = IdentifiedArray<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a sequence of uniquely identified elements")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut array = IdentifiedArray::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(element) = seq.next_element::<T>()? {
                    if array.try_push(element).is_err() {
                        return Err(serde::de::Error::custom(
                            "duplicate element id in identified sequence",
                        ));
                    }
                }
                Ok(array)
            }
        }

        deserializer.deserialize_seq(SeqVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Row {
        id: Uuid,
        name: String,
    }

    impl Identifiable for Row {
        type Id = Uuid;
        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn row(name: &str) -> Row {
        Row {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_push_preserves_order_and_id_lookup() {
        let mut rows = IdentifiedArray::new();
        let a = row("a");
        let b = row("b");
        let c = row("c");
        let b_id = b.id;

        rows.push(a.clone());
        rows.push(b.clone());
        rows.push(c.clone());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], a);
        assert_eq!(rows[1], b);
        assert_eq!(rows[2], c);
        assert_eq!(rows.get(&b_id), Some(&b));
        assert_eq!(rows.index_of(&b_id), Some(1));
    }

    #[test]
    fn test_remove_preserves_remaining_order() {
        let mut rows: IdentifiedArray<Row> =
            [row("a"), row("b"), row("c")].into_iter().collect();
        let ids: Vec<Uuid> = rows.ids().copied().collect();

        let removed = rows.remove(&ids[1]).expect("b should be present");
        assert_eq!(removed.name, "b");
        assert_eq!(rows.ids().copied().collect::<Vec<_>>(), vec![ids[0], ids[2]]);
        assert!(rows.remove(&ids[1]).is_none(), "second remove is a no-op");
    }

    #[test]
    fn test_remove_at_targets_position_not_identity() {
        let mut rows: IdentifiedArray<Row> =
            [row("a"), row("b"), row("c")].into_iter().collect();
        let ids: Vec<Uuid> = rows.ids().copied().collect();

        let removed = rows.remove_at(1);
        assert_eq!(removed.id, ids[1]);
        assert_eq!(rows.ids().copied().collect::<Vec<_>>(), vec![ids[0], ids[2]]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_remove_at_out_of_bounds_panics() {
        let mut rows: IdentifiedArray<Row> = [row("a")].into_iter().collect();
        rows.remove_at(3);
    }

    #[test]
    #[should_panic(expected = "duplicate id")]
    fn test_push_duplicate_id_panics() {
        let a = row("a");
        let mut rows = IdentifiedArray::new();
        rows.push(a.clone());
        rows.push(a);
    }

    #[test]
    fn test_try_push_returns_rejected_element() {
        let a = row("a");
        let mut rows = IdentifiedArray::new();
        rows.push(a.clone());

        let rejected = rows.try_push(a.clone()).unwrap_err();
        assert_eq!(rejected, a);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_insert_at_and_move_at() {
        let mut rows: IdentifiedArray<Row> = [row("a"), row("c")].into_iter().collect();
        let b = row("b");
        rows.insert_at(1, b.clone());
        assert_eq!(rows[1], b);

        rows.move_at(1, 0);
        assert_eq!(rows[0], b);
        assert_eq!(rows.index_of(&b.id), Some(0));
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut rows: IdentifiedArray<Row> = [row("a")].into_iter().collect();
        let id = rows[0].id;

        rows.get_mut(&id).unwrap().name = "renamed".to_string();
        assert_eq!(rows.get(&id).unwrap().name, "renamed");
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let a = row("a");
        let b = row("b");
        let forward: IdentifiedArray<Row> = [a.clone(), b.clone()].into_iter().collect();
        let backward: IdentifiedArray<Row> = [b, a].into_iter().collect();

        assert_ne!(forward, backward);
    }

    #[test]
    fn test_serde_round_trips_in_order() {
        let rows: IdentifiedArray<Row> =
            [row("a"), row("b"), row("c")].into_iter().collect();
        let json = serde_json::to_string(&rows).unwrap();
        let back: IdentifiedArray<Row> = serde_json::from_str(&json).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn test_serde_rejects_duplicate_ids() {
        let a = row("a");
        let json = serde_json::to_string(&vec![a.clone(), a]).unwrap();
        let result: Result<IdentifiedArray<Row>, _> = serde_json::from_str(&json);
        assert!(result.is_err(), "duplicate ids must fail deserialization");
    }
}
