//! Identity-provider handshake and the session-held identity.
//! Keep the public surface thin and split implementation across sub-modules.

mod assertion;
mod layer;
mod principal;
mod provider;

pub use assertion::{EmailEntry, IdentityAssertion};
pub use layer::{identity_session, CurrentIdentity, IdentityStrategy};
pub use principal::AuthorizedPrincipal;
pub use provider::{HandshakeOutcome, IdentityProvider, OAuthProvider, ProviderError, LOGIN_SCOPE};
