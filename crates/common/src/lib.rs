//! Shared types for the marketplace order core.
//!
//! Identifiers, the [`Money`] amount type and the authenticated [`Actor`]
//! that every entry point receives from the identity layer.

pub mod actor;
pub mod ids;
pub mod money;

pub use actor::{Actor, ActorRole, ParseRoleError};
pub use ids::{AddressId, OrderId, ProductId, UserId};
pub use money::Money;
