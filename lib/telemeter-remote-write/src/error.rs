#[derive(Debug, snafu::Snafu, PartialEq, Eq)]
pub enum ConvertError {
    #[snafu(display("family {family} cannot be represented as a remote-write sample"))]
    UnsupportedType { family: String },
}
