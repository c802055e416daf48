use serde_json::Value;

use crate::error::{AggregateError, AggregateResult};
use crate::model::{AggregateDef, Cardinality, ChildKind, Record};

pub const REMARK_KEY: &str = "updateRemark";
pub const ACTOR_KEY: &str = "updatedBy";

/// Raw content of one child section in a write request
#[derive(Debug, Clone, PartialEq)]
pub enum SectionPayload {
    /// Partial row for a 1:1 child
    Single(Record),
    /// Rows for a 1:N collection
    Rows(Vec<Record>),
}

/// A decoded write request: `{ <parent>: {...}, <section>: ..., updateRemark?, updatedBy? }`.
///
/// Sections are kept in the aggregate's declared relation order so that
/// the coordinator always touches child tables in the same sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatePayload {
    pub parent: Option<Record>,
    pub sections: Vec<(ChildKind, SectionPayload)>,
    pub remark: Option<String>,
    pub updated_by: Option<String>,
}

impl AggregatePayload {
    pub fn from_value(aggregate: &AggregateDef, value: Value) -> AggregateResult<Self> {
        let Value::Object(mut body) = value else {
            return Err(AggregateError::validation("request body must be a JSON object"));
        };

        let parent = match body.remove(aggregate.kind.section()) {
            None | Some(Value::Null) => None,
            Some(Value::Object(record)) => Some(record),
            Some(_) => {
                return Err(AggregateError::validation(format!(
                    "'{}' must be an object",
                    aggregate.kind.section()
                )))
            }
        };

        let mut sections = Vec::new();
        for relation in &aggregate.relations {
            let label = relation.child.label();
            let section = match (relation.cardinality, body.remove(label)) {
                (_, None | Some(Value::Null)) => continue,
                (Cardinality::One, Some(Value::Object(record))) => SectionPayload::Single(record),
                (Cardinality::One, Some(_)) => {
                    return Err(AggregateError::validation(format!(
                        "'{}' must be an object",
                        label
                    )))
                }
                (Cardinality::Many, Some(Value::Array(items))) => {
                    SectionPayload::Rows(rows_of(label, items)?)
                }
                (Cardinality::Many, Some(_)) => {
                    return Err(AggregateError::validation(format!(
                        "'{}' must be an array of objects",
                        label
                    )))
                }
            };
            sections.push((relation.child, section));
        }

        Ok(Self {
            parent,
            sections,
            remark: optional_text(&body, REMARK_KEY)?,
            updated_by: optional_text(&body, ACTOR_KEY)?,
        })
    }

    /// Payload touching a single 1:1 section
    pub fn single_section(child: ChildKind, record: Record) -> Self {
        Self {
            sections: vec![(child, SectionPayload::Single(record))],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_none() && self.sections.is_empty()
    }
}

fn rows_of(label: &str, items: Vec<Value>) -> AggregateResult<Vec<Record>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            _ => Err(AggregateError::validation(format!(
                "'{}' must be an array of objects",
                label
            ))),
        })
        .collect()
}

fn optional_text(body: &Record, key: &str) -> AggregateResult<Option<String>> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(AggregateError::validation(format!("'{}' must be a string", key))),
    }
}
