//! Record/schema mapping
//!
//! This module turns application values into the generic `(table, fields)`
//! shape the query builder works on:
//! - Case conversion of type and attribute names
//! - The whitelist of persistable scalar types
//! - Primary key detection, explicit or implied by a leading `id` column
//!
//! Entities describe themselves through the [`Entity`] trait, which the
//! [`entity!`](crate::entity) macro implements for plain structs.
//!
//! # Example
//!
//! ```
//! use sumi_harvest::entity;
//! use sumi_harvest::schema::{Entity, Record};
//!
//! struct BlogEntry {
//!     title: String,
//!     url: String,
//!     tags: Option<String>,
//! }
//!
//! entity!(BlogEntry { title, #[key] url, tags });
//!
//! let entry = BlogEntry { title: "Hello".into(), url: "/hello".into(), tags: None };
//! let record = Record::from_entity(&entry).unwrap();
//! assert_eq!(record.name, "blog_entry");
//! assert!(record.fields[1].is_key);
//! ```

mod naming;
mod record;
mod value;

pub use naming::camel_to_snake;
pub use record::{
    db_type, filter, key, non_key, non_null, values, Attribute, Entity, Field, FieldSelector,
    Record,
};
pub use value::{BindError, Column, Value};

/// Implements [`Entity`] for a struct by listing its fields in order
///
/// Fields marked `#[key]` form the primary key. Every listed field must
/// implement [`Column`].
#[macro_export]
macro_rules! entity {
    (@key key) => {
        true
    };
    (@key) => {
        false
    };
    ($ty:ident { $($(#[$marker:ident])? $field:ident),* $(,)? }) => {
        impl $crate::schema::Entity for $ty {
            fn type_name(&self) -> &str {
                stringify!($ty)
            }

            fn attributes(&self) -> Vec<$crate::schema::Attribute> {
                vec![
                    $($crate::schema::Attribute::new(
                        stringify!($field),
                        $crate::schema::Column::to_value(&self.$field),
                        $crate::entity!(@key $($marker)?),
                    )),*
                ]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    struct Visit {
        id: u32,
        page: String,
        seconds: f64,
        at: chrono::DateTime<Utc>,
        referrer: Option<String>,
    }

    crate::entity!(Visit { id, page, seconds, at, referrer });

    struct Link {
        from_url: String,
        to_url: String,
        weight: i16,
    }

    crate::entity!(Link { #[key] from_url, #[key] to_url, weight });

    #[test]
    fn test_macro_maps_fields_in_order() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let visit = Visit {
            id: 4,
            page: "/".to_string(),
            seconds: 1.5,
            at,
            referrer: None,
        };

        let record = Record::from_entity(&visit).unwrap();
        assert_eq!(record.name, "visit");
        assert_eq!(
            record.fields,
            vec![
                Field::new("id", Some(Value::UInt(4)), true),
                Field::new("page", Some(Value::Text("/".to_string())), false),
                Field::new("seconds", Some(Value::Double(1.5)), false),
                Field::new("at", Some(Value::Timestamp(at)), false),
                Field::new("referrer", None, false),
            ]
        );
    }

    #[test]
    fn test_macro_key_markers() {
        let link = Link {
            from_url: "a".to_string(),
            to_url: "b".to_string(),
            weight: 2,
        };

        let record = Record::from_entity(&link).unwrap();
        let keys: Vec<_> = record.select(&[key]).iter().map(|f| f.name.clone()).collect();
        assert_eq!(keys, vec!["from_url", "to_url"]);
    }
}
