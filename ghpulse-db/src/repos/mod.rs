//! Document collections

pub mod issues;
pub mod repositories;

pub use issues::IssuesRepo;
pub use repositories::RepositoriesRepo;
