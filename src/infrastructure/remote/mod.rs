pub mod memory_source;
pub mod profile_resolver;

pub use memory_source::InMemoryRemoteSource;
pub use profile_resolver::RemoteProfileResolver;
