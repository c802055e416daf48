pub mod audit_log;
pub mod coordinator;
pub mod devices;
pub mod listing;
pub mod lookups;
pub mod reader;
pub mod reconcile;
pub mod validate;

pub use audit_log::*;
pub use coordinator::AggregateCoordinator;
pub use devices::*;
pub use listing::*;
pub use lookups::LookupDirectory;
pub use reader::*;
pub use reconcile::*;
pub use validate::{Mode, Validator};

use std::sync::Arc;

use crate::model::InventorySchema;
use crate::store::AggregateStore;

/// Every core service over one store and one assembled schema
pub struct Inventory<S: AggregateStore> {
    pub schema: Arc<InventorySchema>,
    pub coordinator: AggregateCoordinator<S>,
    pub reader: AggregateReader<S>,
    pub devices: DeviceRegistry<S>,
    pub lister: Lister<S>,
    pub lookups: LookupDirectory<S>,
}

impl<S: AggregateStore> Inventory<S> {
    pub fn new(store: Arc<S>, schema: Arc<InventorySchema>) -> Self {
        Self {
            coordinator: AggregateCoordinator::new(store.clone(), schema.clone()),
            reader: AggregateReader::new(store.clone(), schema.clone()),
            devices: DeviceRegistry::new(store.clone(), schema.clone()),
            lister: Lister::new(store.clone(), schema.clone()),
            lookups: LookupDirectory::new(store, schema.clone()),
            schema,
        }
    }
}
