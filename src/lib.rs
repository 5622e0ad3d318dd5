pub mod aggregator;
pub mod binder;
pub mod codec;
pub mod error;
pub mod history;
pub mod message;
pub mod port;
pub mod report;
pub mod serial;
pub mod settings;
pub mod store;
pub mod table;
pub mod target;
pub mod wifi;

pub use aggregator::{Aggregator, BroadcastReport, Incoming};
pub use binder::{BindEvent, Binder};
pub use codec::{Kind, Value};
pub use error::{LinkError, TableError};
pub use port::{Port, PortSet};
pub use settings::Settings;
pub use store::{MemoryStore, NonVolatile, StoreError};
pub use table::{DispatchEntry, DispatchTable};
pub use target::{Effect, Target};
