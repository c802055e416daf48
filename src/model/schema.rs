use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::model::tables;

/// Name of the own-identifier field on serial-keyed tables.
pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Asset,
    Branch,
}

impl AggregateKind {
    /// Key of the parent section inside a write payload
    pub fn section(&self) -> &'static str {
        match self {
            AggregateKind::Asset => "asset",
            AggregateKind::Branch => "branch",
        }
    }

    /// Human readable entity name used in error messages
    pub fn entity(&self) -> &'static str {
        match self {
            AggregateKind::Asset => "Asset",
            AggregateKind::Branch => "Branch",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity())
    }
}

/// Every dependent table the inventory knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildKind {
    Technical,
    Commercial,
    License,
    Infra,
    Scanner,
    Projector,
    Printer,
    Desktop,
    Laptop,
    Cctv,
    Panel,
    IpPhone,
}

impl ChildKind {
    pub const ALL: [ChildKind; 12] = [
        ChildKind::Technical,
        ChildKind::Commercial,
        ChildKind::License,
        ChildKind::Infra,
        ChildKind::Scanner,
        ChildKind::Projector,
        ChildKind::Printer,
        ChildKind::Desktop,
        ChildKind::Laptop,
        ChildKind::Cctv,
        ChildKind::Panel,
        ChildKind::IpPhone,
    ];

    /// Section label used in payloads, composed documents and URL segments
    pub fn label(&self) -> &'static str {
        match self {
            ChildKind::Technical => "technical",
            ChildKind::Commercial => "commercial",
            ChildKind::License => "license",
            ChildKind::Infra => "infra",
            ChildKind::Scanner => "scanners",
            ChildKind::Projector => "projectors",
            ChildKind::Printer => "printers",
            ChildKind::Desktop => "desktops",
            ChildKind::Laptop => "laptops",
            ChildKind::Cctv => "cctvs",
            ChildKind::Panel => "panels",
            ChildKind::IpPhone => "ipphones",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// The child row's identifier is the parent's identifier
    ParentKey,
    /// The child row has its own identifier plus a non-null parent reference
    OwnIdScopedToParent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnType {
    Text { max_len: Option<usize> },
    Phone,
    Integer,
    Decimal,
    Date,
    DateTime,
    Enum(&'static [&'static str]),
}

impl ColumnType {
    /// SQL type a bound text parameter is cast to
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text { .. } | ColumnType::Phone | ColumnType::Enum(_) => "text",
            ColumnType::Integer => "bigint",
            ColumnType::Decimal => "numeric",
            ColumnType::Date => "date",
            ColumnType::DateTime => "timestamptz",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnSource {
    /// Written from the payload field of the same name (or its alias)
    Payload,
    /// Hex SHA-256 of another payload field; the source value is never stored
    Sha256Of(&'static str),
    /// Maintained by the store on insert
    CreatedAt,
    /// Maintained by the store on insert and update
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnDef {
    pub field: &'static str,
    pub column: &'static str,
    pub ty: ColumnType,
    pub source: ColumnSource,
    pub required: bool,
    pub default: Option<&'static str>,
    pub alias: Option<&'static str>,
}

impl ColumnDef {
    pub const fn new(field: &'static str, column: &'static str, ty: ColumnType) -> Self {
        Self {
            field,
            column,
            ty,
            source: ColumnSource::Payload,
            required: false,
            default: None,
            alias: None,
        }
    }

    pub const fn text(field: &'static str, column: &'static str, max_len: usize) -> Self {
        Self::new(field, column, ColumnType::Text { max_len: Some(max_len) })
    }

    pub const fn long_text(field: &'static str, column: &'static str) -> Self {
        Self::new(field, column, ColumnType::Text { max_len: None })
    }

    pub const fn created_at(field: &'static str, column: &'static str) -> Self {
        Self::new(field, column, ColumnType::DateTime).derived(ColumnSource::CreatedAt)
    }

    pub const fn updated_at(field: &'static str, column: &'static str) -> Self {
        Self::new(field, column, ColumnType::DateTime).derived(ColumnSource::UpdatedAt)
    }

    pub const fn required(self) -> Self {
        Self { required: true, ..self }
    }

    pub const fn with_default(self, default: &'static str) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    pub const fn with_alias(self, alias: &'static str) -> Self {
        Self {
            alias: Some(alias),
            ..self
        }
    }

    pub const fn derived(self, source: ColumnSource) -> Self {
        Self { source, ..self }
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self.source, ColumnSource::CreatedAt | ColumnSource::UpdatedAt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKey {
    /// Auto-incrementing `id`
    Serial,
    /// Keyed directly by the parent reference
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub table: &'static str,
    pub field: &'static str,
    pub column: &'static str,
}

#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub key: TableKey,
    pub parent: Option<ParentRef>,
    pub columns: &'static [ColumnDef],
    /// Fields carrying a uniqueness constraint
    pub unique: &'static [&'static str],
}

impl TableDef {
    pub fn column(&self, field: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn parent_field(&self) -> Option<&'static str> {
        self.parent.map(|p| p.field)
    }

    /// Field holding the row's primary key
    pub fn key_field(&self) -> &'static str {
        match (self.key, self.parent) {
            (TableKey::Parent, Some(parent)) => parent.field,
            _ => ID_FIELD,
        }
    }

    /// Column holding the row's primary key
    pub fn key_column(&self) -> &'static str {
        match (self.key, self.parent) {
            (TableKey::Parent, Some(parent)) => parent.column,
            _ => "id",
        }
    }

    /// Map a SQL column name back to its wire field name
    pub fn field_for_column(&self, column: &str) -> Option<&'static str> {
        if self.key == TableKey::Serial && column == "id" {
            return Some(ID_FIELD);
        }
        if let Some(parent) = self.parent {
            if parent.column == column {
                return Some(parent.field);
            }
        }
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.field)
    }

    pub fn has_timestamps(&self) -> bool {
        self.columns.iter().any(|c| c.is_timestamp())
    }
}

/// One row of the relation table.
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub parent: AggregateKind,
    pub child: ChildKind,
    pub cardinality: Cardinality,
    pub key: KeyStrategy,
    pub table: &'static TableDef,
}

/// Append-only remark table attached to an aggregate.
#[derive(Debug, Clone, Copy)]
pub struct AuditDef {
    pub table: &'static TableDef,
}

impl AuditDef {
    pub const REMARK_FIELD: &'static str = "remarks";
    pub const ACTOR_FIELD: &'static str = "updatedBy";
    pub const TIME_FIELD: &'static str = "dateUpdated";
}

/// Parent column referencing a shared lookup table. The referenced row
/// is embedded in reads under `label`.
#[derive(Debug, Clone, Copy)]
pub struct LookupDef {
    pub field: &'static str,
    pub label: &'static str,
    pub table: &'static TableDef,
}

/// Query parameters the list endpoint understands for an aggregate.
#[derive(Debug, Clone, Copy)]
pub struct ListSpec {
    /// (query parameter, field) pairs matched by equality
    pub filters: &'static [(&'static str, &'static str)],
    /// Fields searched case-insensitively by `search`
    pub search: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct AggregateDef {
    pub kind: AggregateKind,
    pub parent: &'static TableDef,
    pub relations: Vec<Relation>,
    pub audit: AuditDef,
    pub lookups: Vec<LookupDef>,
    pub list: ListSpec,
}

impl AggregateDef {
    pub fn relation(&self, child: ChildKind) -> Option<&Relation> {
        self.relations.iter().find(|r| r.child == child)
    }

    pub fn singular(&self) -> impl Iterator<Item = &Relation> {
        self.relations
            .iter()
            .filter(|r| r.cardinality == Cardinality::One)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Relation> {
        self.relations
            .iter()
            .filter(|r| r.cardinality == Cardinality::Many)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("relation {parent}/{child}: {message}")]
    InvalidRelation {
        parent: AggregateKind,
        child: ChildKind,
        message: String,
    },
    #[error("{child} is declared under both {first} and {second}")]
    DuplicateChild {
        child: ChildKind,
        first: AggregateKind,
        second: AggregateKind,
    },
    #[error("lookup {parent}.{field}: {message}")]
    InvalidLookup {
        parent: AggregateKind,
        field: &'static str,
        message: String,
    },
    #[error("audit table {table} for {parent}: {message}")]
    InvalidAudit {
        parent: AggregateKind,
        table: &'static str,
        message: String,
    },
}

/// The assembled relation table for every aggregate family.
#[derive(Debug, Clone)]
pub struct InventorySchema {
    asset: AggregateDef,
    branch: AggregateDef,
}

impl InventorySchema {
    /// Declare every parent/child/audit relation and validate it
    pub fn assemble() -> Result<Self, SchemaError> {
        use AggregateKind::{Asset, Branch};
        use Cardinality::{Many, One};

        let asset = AggregateDef {
            kind: Asset,
            parent: &tables::ASSETS,
            relations: vec![
                relation(Asset, ChildKind::Technical, One, &tables::ASSET_TECHNICAL),
                relation(Asset, ChildKind::Commercial, One, &tables::ASSET_COMMERCIAL),
                relation(Asset, ChildKind::License, One, &tables::ASSET_LICENSE),
            ],
            audit: AuditDef {
                table: &tables::ASSET_REMARKS,
            },
            lookups: Vec::new(),
            list: ListSpec {
                filters: &[
                    ("brandedOption", "brandedOptionCode"),
                    ("department", "departmentId"),
                    ("group", "groupId"),
                    ("subCategory", "subCategoryCode"),
                    ("status", "status"),
                    ("condition", "assetCondition"),
                    ("branch", "branch"),
                ],
                search: &["assetCode", "assetName", "branch", "brand", "userAllocated"],
            },
        };

        let branch = AggregateDef {
            kind: Branch,
            parent: &tables::BRANCHES,
            relations: vec![
                relation(Branch, ChildKind::Infra, One, &tables::BRANCH_INFRA),
                relation(Branch, ChildKind::Scanner, Many, &tables::BRANCH_SCANNERS),
                relation(Branch, ChildKind::Projector, Many, &tables::BRANCH_PROJECTORS),
                relation(Branch, ChildKind::Printer, Many, &tables::BRANCH_PRINTERS),
                relation(Branch, ChildKind::Desktop, Many, &tables::BRANCH_DESKTOPS),
                relation(Branch, ChildKind::Laptop, Many, &tables::BRANCH_LAPTOPS),
                relation(Branch, ChildKind::Cctv, Many, &tables::BRANCH_CCTVS),
                relation(Branch, ChildKind::Panel, Many, &tables::BRANCH_PANELS),
                relation(Branch, ChildKind::IpPhone, Many, &tables::BRANCH_IP_PHONES),
            ],
            audit: AuditDef {
                table: &tables::BRANCH_REMARKS,
            },
            lookups: vec![LookupDef {
                field: "service_station_id",
                label: "serviceStation",
                table: &tables::SERVICE_STATIONS,
            }],
            list: ListSpec {
                filters: &[("region", "region")],
                search: &["name", "manager_name", "address", "region"],
            },
        };

        let schema = Self { asset, branch };
        schema.validate()?;
        Ok(schema)
    }

    pub fn aggregate(&self, kind: AggregateKind) -> &AggregateDef {
        match kind {
            AggregateKind::Asset => &self.asset,
            AggregateKind::Branch => &self.branch,
        }
    }

    pub fn aggregates(&self) -> [&AggregateDef; 2] {
        [&self.asset, &self.branch]
    }

    /// Find the relation declaring `child`, together with its owning aggregate
    pub fn owner_of(&self, child: ChildKind) -> Option<(&AggregateDef, &Relation)> {
        self.aggregates()
            .into_iter()
            .find_map(|agg| agg.relation(child).map(|rel| (agg, rel)))
    }

    /// Every table in the schema, parents first
    pub fn tables(&self) -> Vec<&'static TableDef> {
        let mut out = Vec::new();
        for agg in self.aggregates() {
            out.push(agg.parent);
            out.extend(agg.relations.iter().map(|r| r.table));
            out.push(agg.audit.table);
        }
        for agg in self.aggregates() {
            for lookup in &agg.lookups {
                if !out.iter().any(|t| t.name == lookup.table.name) {
                    out.push(lookup.table);
                }
            }
        }
        out
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let mut owners: HashMap<ChildKind, AggregateKind> = HashMap::new();

        for agg in self.aggregates() {
            for rel in &agg.relations {
                if let Some(first) = owners.insert(rel.child, agg.kind) {
                    return Err(SchemaError::DuplicateChild {
                        child: rel.child,
                        first,
                        second: agg.kind,
                    });
                }
                check_relation(agg, rel)?;
            }

            let audit = agg.audit.table;
            let invalid = |message: &str| SchemaError::InvalidAudit {
                parent: agg.kind,
                table: audit.name,
                message: message.to_string(),
            };
            if audit.key != TableKey::Serial {
                return Err(invalid("audit rows need their own identifier"));
            }
            if audit.parent.map(|p| p.table) != Some(agg.parent.name) {
                return Err(invalid("audit rows must reference the parent table"));
            }
            for field in [
                AuditDef::REMARK_FIELD,
                AuditDef::ACTOR_FIELD,
                AuditDef::TIME_FIELD,
            ] {
                if audit.column(field).is_none() {
                    return Err(invalid(&format!("missing column {}", field)));
                }
            }

            for lookup in &agg.lookups {
                check_lookup(agg, lookup)?;
            }
        }

        Ok(())
    }
}

fn relation(
    parent: AggregateKind,
    child: ChildKind,
    cardinality: Cardinality,
    table: &'static TableDef,
) -> Relation {
    let key = match cardinality {
        Cardinality::One => KeyStrategy::ParentKey,
        Cardinality::Many => KeyStrategy::OwnIdScopedToParent,
    };
    Relation {
        parent,
        child,
        cardinality,
        key,
        table,
    }
}

fn check_relation(agg: &AggregateDef, rel: &Relation) -> Result<(), SchemaError> {
    let invalid = |message: &str| SchemaError::InvalidRelation {
        parent: agg.kind,
        child: rel.child,
        message: message.to_string(),
    };

    if rel.parent != agg.kind {
        return Err(invalid("declared under the wrong aggregate"));
    }
    let Some(parent_ref) = rel.table.parent else {
        return Err(invalid("child table has no parent reference"));
    };
    if parent_ref.table != agg.parent.name {
        return Err(invalid("child table references a different parent table"));
    }

    match (rel.cardinality, rel.key, rel.table.key) {
        (Cardinality::One, KeyStrategy::ParentKey, TableKey::Parent) => Ok(()),
        (Cardinality::Many, KeyStrategy::OwnIdScopedToParent, TableKey::Serial) => Ok(()),
        (Cardinality::One, _, _) => Err(invalid("1:1 children must be keyed by the parent id")),
        (Cardinality::Many, _, _) => {
            Err(invalid("1:N children need their own id scoped to the parent"))
        }
    }
}

fn check_lookup(agg: &AggregateDef, lookup: &LookupDef) -> Result<(), SchemaError> {
    let invalid = |message: &str| SchemaError::InvalidLookup {
        parent: agg.kind,
        field: lookup.field,
        message: message.to_string(),
    };

    match agg.parent.column(lookup.field) {
        Some(column) if column.ty == ColumnType::Integer => {}
        Some(_) => return Err(invalid("reference column must be an integer")),
        None => return Err(invalid("no such parent column")),
    }
    if lookup.table.key != TableKey::Serial || lookup.table.parent.is_some() {
        return Err(invalid("lookup tables are standalone and serial-keyed"));
    }
    if agg.relations.iter().any(|r| r.child.label() == lookup.label) {
        return Err(invalid("label collides with a child section"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_declares_both_families() {
        let schema = InventorySchema::assemble().expect("schema assembles");

        let asset = schema.aggregate(AggregateKind::Asset);
        assert_eq!(asset.parent.name, "assets");
        assert_eq!(asset.singular().count(), 3);
        assert_eq!(asset.collections().count(), 0);
        assert_eq!(asset.audit.table.name, "asset_remarks");

        let branch = schema.aggregate(AggregateKind::Branch);
        assert_eq!(branch.singular().count(), 1);
        assert_eq!(branch.collections().count(), 8);
    }

    #[test]
    fn test_one_to_one_children_are_keyed_by_parent() {
        let schema = InventorySchema::assemble().unwrap();
        for agg in schema.aggregates() {
            for rel in agg.singular() {
                assert_eq!(rel.key, KeyStrategy::ParentKey);
                assert_eq!(rel.table.key_field(), rel.table.parent_field().unwrap());
            }
            for rel in agg.collections() {
                assert_eq!(rel.key, KeyStrategy::OwnIdScopedToParent);
                assert_eq!(rel.table.key_field(), ID_FIELD);
            }
        }
    }

    #[test]
    fn test_owner_lookup_and_labels() {
        let schema = InventorySchema::assemble().unwrap();

        let (agg, rel) = schema.owner_of(ChildKind::Printer).unwrap();
        assert_eq!(agg.kind, AggregateKind::Branch);
        assert_eq!(rel.table.name, "branch_printers");

        for kind in ChildKind::ALL {
            assert_eq!(ChildKind::from_label(kind.label()), Some(kind));
            assert!(schema.owner_of(kind).is_some(), "{} has no owner", kind);
        }
        assert_eq!(ChildKind::from_label("routers"), None);
    }

    #[test]
    fn test_column_mapping_round_trips_through_sql_names() {
        let table = &tables::ASSET_TECHNICAL;
        assert_eq!(table.field_for_column("asset_id"), Some("assetId"));
        assert_eq!(table.field_for_column("ip_address"), Some("ipAddress"));
        assert_eq!(table.field_for_column("nope"), None);
        assert_eq!(table.key_column(), "asset_id");

        assert_eq!(tables::ASSETS.key_column(), "id");
        assert!(tables::ASSETS.has_timestamps());
        assert!(!tables::ASSET_LICENSE.has_timestamps());
    }

    #[test]
    fn test_misdeclared_relation_is_rejected() {
        let schema = InventorySchema::assemble().unwrap();
        let asset = schema.aggregate(AggregateKind::Asset);
        let bad = Relation {
            parent: AggregateKind::Asset,
            child: ChildKind::Technical,
            cardinality: Cardinality::Many,
            key: KeyStrategy::OwnIdScopedToParent,
            table: &tables::ASSET_TECHNICAL,
        };

        let err = check_relation(asset, &bad).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRelation { .. }));
    }

    #[test]
    fn test_branch_references_service_stations() {
        let schema = InventorySchema::assemble().unwrap();
        let branch = schema.aggregate(AggregateKind::Branch);

        assert_eq!(branch.lookups.len(), 1);
        assert_eq!(branch.lookups[0].table.name, "service_stations");
        assert!(schema.aggregate(AggregateKind::Asset).lookups.is_empty());
        assert_eq!(
            schema.tables().iter().filter(|t| t.name == "service_stations").count(),
            1
        );
    }

    #[test]
    fn test_misdeclared_lookup_is_rejected() {
        let schema = InventorySchema::assemble().unwrap();
        let branch = schema.aggregate(AggregateKind::Branch);

        let text_column = LookupDef {
            field: "region",
            label: "regionInfo",
            table: &tables::SERVICE_STATIONS,
        };
        assert!(matches!(
            check_lookup(branch, &text_column),
            Err(SchemaError::InvalidLookup { .. })
        ));

        let child_table = LookupDef {
            field: "service_station_id",
            label: "serviceStation",
            table: &tables::BRANCH_PRINTERS,
        };
        assert!(check_lookup(branch, &child_table).is_err());

        let clashing = LookupDef {
            field: "service_station_id",
            label: "printers",
            table: &tables::SERVICE_STATIONS,
        };
        assert!(check_lookup(branch, &clashing).is_err());
    }
}
