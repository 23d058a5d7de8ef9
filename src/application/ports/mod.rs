pub mod profile_resolver;
pub mod remote_source;
pub mod upload_transport;

pub use profile_resolver::ProfileResolver;
pub use remote_source::{
    LiveQueryHandle, RawRecord, RemoteCollectionSource, SnapshotSink, SubscriptionSignal, WriteAck,
};
pub use upload_transport::{UploadTransport, UploadedFile};
