pub mod user_repo;
pub use user_repo::UserRepository;
pub mod request_repo;
pub use request_repo::RequestRepository;
