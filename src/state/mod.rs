mod bus;
mod interrupt;
mod reconcile;
pub mod registry;
mod session;
mod step;

pub use bus::{CallbackBus, SessionUpdate, SubscriberId, Subscription};
pub use interrupt::InterruptCoordinator;
pub use reconcile::{merge, ThreadBook};
pub use registry::{RegistryConfig, StreamRegistry};
pub use session::{Applied, SessionPhase, StreamSession, StreamState};
pub use step::{Step, StepId, StepKind, StepPreview};
