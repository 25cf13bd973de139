// Application layer - Use case interactors

pub mod compose_interactor;
pub mod container;

pub use compose_interactor::ComposeInteractor;
pub use container::{AppContainer, DefaultAppContainer};
