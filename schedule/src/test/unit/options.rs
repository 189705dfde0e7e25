use crate::options::{DEFAULT_ALIGNMENT, ScheduleOptions};
use crate::test::helpers::{dma, sram};

#[test]
fn builder_defaults() {
    let opts = ScheduleOptions::builder().mem_loc(sram()).mem_kib(16).xfer_loc(dma()).build();
    assert_eq!(opts.mem_bytes(), 16 * 1024);
    assert_eq!(opts.alignment, 0);
    assert_eq!(opts.effective_alignment(), DEFAULT_ALIGNMENT);
}

#[test]
fn explicit_alignment_wins() {
    let opts = ScheduleOptions::builder().mem_loc(sram()).mem_kib(1).alignment(64).xfer_loc(dma()).build();
    assert_eq!(opts.effective_alignment(), 64);
}
