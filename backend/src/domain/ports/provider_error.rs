//! Error taxonomy shared by the text generation and audio synthesis ports.

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by a billable generation provider call.
    pub enum ProviderError {
        /// The call did not complete within its timeout.
        Timeout { message: String } =>
            "provider call timed out: {message}",
        /// The provider asked the caller to slow down.
        RateLimited { message: String } =>
            "provider rate limited the request: {message}",
        /// Transport failure or provider-side outage.
        Unavailable { message: String } =>
            "provider unavailable: {message}",
        /// The provider refused the input; retrying cannot help.
        Rejected { message: String } =>
            "provider rejected the request: {message}",
        /// The provider responded with output that could not be used.
        Malformed { message: String } =>
            "provider returned malformed output: {message}",
    }
    retryable: [Timeout, RateLimited, Unavailable, Malformed]
}
