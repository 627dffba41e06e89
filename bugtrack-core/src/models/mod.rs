mod comment;
mod file;
mod history;
mod project;
mod ticket;
mod user;

pub use comment::*;
pub use file::*;
pub use history::*;
pub use project::*;
pub use ticket::*;
pub use user::*;
