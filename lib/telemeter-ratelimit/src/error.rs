#[derive(Debug, snafu::Snafu, PartialEq, Eq)]
pub enum RateLimitError {
    #[snafu(display("partition {partition} has exceeded its write rate limit"))]
    WriteLimitReached { partition: String },
}
