//! # Gateway Providers
//!
//! Provider adapters for the agent gateway.
//!
//! Adapters implement [`gateway_core::Provider`]. The [`ProviderFactory`]
//! builds them by name so the configured primary and fallback order can be
//! turned into a provider list at startup. Only the echoing
//! [`MockProvider`] ships in-tree; vendor adapters register themselves with
//! the factory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod mock;
pub mod registry;

// Re-export main types
pub use mock::{MockProvider, MOCK_PROVIDER_ID};
pub use registry::{ProviderConstructor, ProviderFactory, ProviderSettings};
