#[derive(Debug, snafu::Snafu)]
pub enum SignError {
    #[snafu(display("unsupported key type or curve for JWT signing"))]
    UnsupportedKey,
    #[snafu(display("failed to sign token: {source}"))]
    Signing { source: jsonwebtoken::errors::Error },
}

#[derive(Debug, snafu::Snafu, PartialEq, Eq)]
pub enum VerifyError {
    #[snafu(display("token issuer does not match the configured issuer"))]
    BadIssuer,
    #[snafu(display("token has expired"))]
    TokenExpired,
    #[snafu(display("token is not yet valid"))]
    TokenNotYetValid,
    #[snafu(display("token audience does not include a configured audience"))]
    BadAudience,
    #[snafu(display("token signature did not verify against any configured key"))]
    InvalidSignature,
    #[snafu(display("token is malformed"))]
    Malformed,
}
