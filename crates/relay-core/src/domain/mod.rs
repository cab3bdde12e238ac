//! Domain model (IDs, task records, messages, states, errors, events).

pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod outbound;
pub mod retry;
pub mod route;
pub mod state;
pub mod task;

pub use self::errors::{ErrorKind, RelayError};
pub use self::events::TaskEvent;
pub use self::ids::TaskId;
pub use self::message::{ConversationKind, InboundMessage, MessageContent};
pub use self::outbound::{ContentKind, OutboundMessage, ReplyTarget};
pub use self::retry::RetryPolicy;
pub use self::route::Route;
pub use self::state::TaskState;
pub use self::task::{NewTask, TaskRecord, TransitionError};
