use super::types::Credentials;

/// Structural completeness check for a connection request. Never touches the network.
pub fn validate(creds: &Credentials) -> bool {
    [
        &creds.database_name,
        &creds.host,
        &creds.username,
        &creds.password,
    ]
    .iter()
    .all(|field| !field.trim().is_empty())
}
