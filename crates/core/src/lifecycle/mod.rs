pub mod callback;
pub mod engine;
pub mod states;

pub use callback::{parse_callback_data, CallbackAction, CallbackData, CallbackParseError};
pub use engine::{LifecycleEngine, LifecycleError};
pub use states::{
    LifecycleAction, LifecycleContext, LifecycleEvent, LifecycleStep, NotificationKind,
    TransitionOutcome,
};
