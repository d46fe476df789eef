mod icp_params;
pub use icp_params::IcpParams;
mod correspondence;
pub use correspondence::{find_correspondences, Correspondence, MatchStatus};
mod reduction;
pub use reduction::{reduce, NormalEquations};
mod tracker;
pub use tracker::{IcpTracker, TrackingResult};
