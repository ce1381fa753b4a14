//! Widgets for the chat screen

pub mod composer;
pub mod markdown;
pub mod selector;
pub mod spinner;
pub mod thread_list;
pub mod turn_list;

pub use composer::Composer;
pub use selector::{ConfirmPrompt, Selector, SelectorItem, SelectorState};
pub use spinner::Spinner;
pub use thread_list::{ThreadEntry, ThreadList};
pub use turn_list::{TurnList, TurnRole, TurnView};
