pub mod normalizer;
pub mod session;

pub use normalizer::EntityNormalizer;
pub use session::SessionContext;
