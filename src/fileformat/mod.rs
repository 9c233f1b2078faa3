pub mod discover;
pub mod fastq;

pub use discover::discover_lanes;
pub use discover::files_for_lane;
pub use discover::lane_of;
pub use discover::list_fastq_files;
pub use discover::primary_read_files;

pub use fastq::open_fastq;
pub use fastq::FastqGzWriter;
