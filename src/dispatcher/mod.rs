pub mod dispatcher;
pub mod state;

pub use dispatcher::TaskDispatcher;
pub use state::DispatcherState;
