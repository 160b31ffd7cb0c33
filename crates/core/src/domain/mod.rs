pub mod conversation;
pub mod reply;
pub mod thread_state;
pub mod turn;
