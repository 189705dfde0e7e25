use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Some statement's refinements cannot simultaneously fit in cache under
    /// any placement strategy. The only recoverable failure of the pass; the
    /// caller must raise capacity or restructure the block.
    #[snafu(display(
        "block {block:?} requires more cache than the {mem_kib} KiB available; \
         simultaneously required refinements: {refs:?}"
    ))]
    ResourceExhausted { block: String, mem_kib: u64, refs: Vec<String> },
}
