// Resolver implementations. Exactly one is constructed per run, chosen by
// `ResolverMode`.

pub mod browser;
pub mod direct;
pub mod static_probe;
pub mod token;

pub use browser::BrowserResolver;
pub use direct::DirectResolver;
pub use static_probe::StaticResolver;
