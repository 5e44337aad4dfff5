//! [`TestValue`]: a concrete boundary probe keyed by the [`Property`] it
//! constrains (spec.md §3, §4.3). The enumerator groups these by property,
//! dedupes within a group, and crosses the groups (spec.md §4.7).

use std::fmt;
use std::sync::Arc;

use crate::generator::StateGenerator;
use crate::property::Property;

/// `restrict_fn` realizes the test value on a generator; it is boxed rather
/// than generic so [`TestValue`] can live in one flat `Vec` regardless of
/// which expression's type it came from (conditions emit these from many
/// different expression types -- spec.md §4.3's `get_test_values`).
#[derive(Clone)]
pub struct TestValue {
    pub property: Property,
    /// Used only for diagnostics (`generator-info`, dedup tie-breaking
    /// when two values print the same); the actual dedup key is
    /// `(property, label)` rather than a domain comparison, since a flat
    /// `Vec<TestValue>` has already erased each value's concrete type.
    pub label: String,
    restrict_fn: Arc<dyn Fn(&mut StateGenerator) + Send + Sync>,
}

impl TestValue {
    pub fn new(
        property: Property,
        label: impl Into<String>,
        restrict_fn: impl Fn(&mut StateGenerator) + Send + Sync + 'static,
    ) -> Self {
        Self { property, label: label.into(), restrict_fn: Arc::new(restrict_fn) }
    }

    pub fn restrict(&self, gen: &mut StateGenerator) {
        (self.restrict_fn)(gen)
    }

    /// Dedup key: two test values for the same property with the same
    /// rendered label are considered the same boundary probe.
    pub fn dedup_key(&self) -> (Property, String) {
        (self.property.clone(), self.label.clone())
    }
}

impl fmt::Debug for TestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestValue({} = {})", self.property, self.label)
    }
}

/// Groups test values by property (spec.md §4.7 step 1), deduplicating
/// within each group and sorting groups by property name for determinism.
pub fn group_by_property(values: Vec<TestValue>) -> Vec<(Property, Vec<TestValue>)> {
    let mut groups: Vec<(Property, Vec<TestValue>)> = Vec::new();
    for value in values {
        let key = value.dedup_key();
        if let Some((_, group)) = groups.iter_mut().find(|(p, _)| *p == value.property) {
            if group.iter().any(|v| v.dedup_key() == key) {
                continue;
            }
            group.push(value);
        } else {
            groups.push((value.property.clone(), vec![value]));
        }
    }
    groups.sort_by(|(a, _), (b, _)| a.to_string().cmp(&b.to_string()));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_labels_for_same_property_are_dropped() {
        let values = vec![
            TestValue::new(Property::Gas, "3", |g| g.set_gas(3)),
            TestValue::new(Property::Gas, "3", |g| g.set_gas(3)),
            TestValue::new(Property::Gas, "4", |g| g.set_gas(4)),
        ];
        let groups = group_by_property(values);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn groups_are_sorted_by_property_name() {
        let values = vec![
            TestValue::new(Property::StackSize, "1", |g| g.set_stack_size(1)),
            TestValue::new(Property::Gas, "1", |g| g.set_gas(1)),
        ];
        let groups = group_by_property(values);
        assert_eq!(groups[0].0.to_string(), "gas");
        assert_eq!(groups[1].0.to_string(), "stackSize");
    }
}
