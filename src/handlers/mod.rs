mod echo;
mod health;
mod login;
mod search;

pub use echo::echo_message;
pub use health::health_check;
pub use login::login;
pub use search::search_books;
