//! Repositories: stateless structs with associated functions taking a
//! `PgPool`. One short query per function; no query builders.

pub mod desktop_repo;
pub mod session_repo;
pub mod tenant_repo;
pub mod user_repo;

pub use desktop_repo::DesktopRepo;
pub use session_repo::SessionRepo;
pub use tenant_repo::TenantRepo;
pub use user_repo::UserRepo;
