pub mod entity;
pub mod repository;
pub mod usecase;

pub use entity::{ConcurrencyUpdate, NewTenant, Tenant, TenantUpdate};
pub use usecase::TenantUseCase;
