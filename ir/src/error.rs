use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("duplicate refinement name {name:?}"))]
    DuplicateRefinement { name: String },

    #[snafu(display("block {stmt:?} references unknown refinement {name:?}"))]
    DanglingRefName { stmt: String, name: String },

    #[snafu(display(
        "refinement {name:?} has {access_rank} access affines for a rank-{shape_rank} shape"
    ))]
    AccessRankMismatch { name: String, access_rank: usize, shape_rank: usize },
}
