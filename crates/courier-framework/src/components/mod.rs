//! Built-in components.

mod feedback;
mod manager;
mod modmail;

pub use feedback::Feedback;
pub use manager::Manager;
pub use modmail::ModMail;
