/// Per-request metadata captured by the auth middleware and made available
/// to handlers through request extensions.
///
/// `request_id` is the correlation id propagated into webhook events; it is
/// taken from the `x-request-id` header the request-id middleware guarantees.
#[derive(Clone, Debug)]
pub struct RequestMetadata {
    pub request_id: String,
    pub ip_address: String,
    pub user_agent: String,
}
