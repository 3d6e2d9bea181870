use kernel_tools::block::{Block, DevPtr, WARP_SIZE};
use kernel_tools::warp_scan::{
    exclusive_warp_scan, exclusive_warp_scan_padded, inclusive_warp_scan, padded, WarpScanWidth,
    WARP_BUF_LEN,
};
use prims_cuda::scan::sequential_exclusive_scan;
use prims_cuda::sim::{launch, LaunchConfig, SharedArray};

#[test]
fn inclusive_and_exclusive_over_two_warps() {
    let xs = (0..64u32).map(|i| i % 5 + 1).collect::<Vec<_>>();
    let mut inclusive = vec![0u32; 64];
    let mut exclusive = vec![0u32; 64];
    let dev_xs = DevPtr::new(xs.as_ptr() as *mut u32);
    let dev_inclusive = DevPtr::new(inclusive.as_mut_ptr());
    let dev_exclusive = DevPtr::new(exclusive.as_mut_ptr());

    launch(
        LaunchConfig::new(1, 64),
        || SharedArray::<u32>::new(4 * WARP_BUF_LEN),
        |block, bufs| unsafe {
            let t = block.thread_idx();
            let x = *dev_xs.as_ptr().add(t);
            let buf = bufs.as_mut_ptr().add(block.warp() * 2 * WARP_BUF_LEN);
            *dev_inclusive.as_mut_ptr().add(t) = inclusive_warp_scan(block, x, 1, WARP_SIZE, buf);
            let buf = buf.add(WARP_BUF_LEN);
            *dev_exclusive.as_mut_ptr().add(t) = exclusive_warp_scan(block, x, 1, WARP_SIZE, buf);
        },
    )
    .unwrap();

    for warp in 0..2 {
        let lanes = warp * 32..(warp + 1) * 32;
        let expected = sequential_exclusive_scan(&xs[lanes.clone()]);
        assert_eq!(&exclusive[lanes.clone()], &expected[..]);
        for (i, lane) in lanes.enumerate() {
            assert_eq!(inclusive[lane], expected[i] + xs[lane]);
        }
    }
}

#[test]
fn strided_scan_keeps_residues_apart() {
    let stride = 4;
    let xs = (0..32u32).collect::<Vec<_>>();
    let mut out = vec![0u32; 32];
    let dev_out = DevPtr::new(out.as_mut_ptr());

    launch(
        LaunchConfig::new(1, 32),
        || SharedArray::<u32>::new(WARP_BUF_LEN),
        |block, buf| unsafe {
            let lane = block.lane();
            *dev_out.as_mut_ptr().add(lane) =
                inclusive_warp_scan(block, lane as u32, stride, WARP_SIZE, buf.as_mut_ptr());
        },
    )
    .unwrap();

    for lane in 0..32 {
        let expected = (lane % stride..=lane).step_by(stride).map(|i| xs[i]).sum::<u32>();
        assert_eq!(out[lane], expected, "lane {lane}");
    }
}

#[test]
fn narrow_width_stops_early() {
    // Offsets 1, 2 and 4 only: lanes scan within groups of 8.
    let mut out = vec![0u32; 32];
    let dev_out = DevPtr::new(out.as_mut_ptr());
    launch(
        LaunchConfig::new(1, 32),
        || SharedArray::<u32>::new(WARP_BUF_LEN),
        |block, buf| unsafe {
            *dev_out.as_mut_ptr().add(block.lane()) =
                inclusive_warp_scan(block, 1, 1, 8, buf.as_mut_ptr());
        },
    )
    .unwrap();
    assert_eq!(&out[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(out[31], 8);
}

fn padded_scan(width: WarpScanWidth) {
    let len = width.len();
    let xs = (0..len as u32).map(|i| (i * 7) % 11).collect::<Vec<_>>();
    let mut data = vec![u32::MAX; width.padded_len()];
    for (i, &x) in xs.iter().enumerate() {
        data[padded(i)] = x;
    }
    let mut total = 0u32;
    let dev_data = DevPtr::new(data.as_mut_ptr());
    let dev_total = DevPtr::new(&mut total as *mut u32);

    launch(
        LaunchConfig::new(1, 32),
        || SharedArray::<u32>::new(WARP_BUF_LEN),
        |block, buf| unsafe {
            let t = exclusive_warp_scan_padded(block, dev_data.as_mut_ptr(), width, buf.as_mut_ptr());
            if block.lane() == 0 {
                *dev_total.as_mut_ptr() = t;
            }
        },
    )
    .unwrap();

    let expected = sequential_exclusive_scan(&xs);
    for i in 0..len {
        assert_eq!(data[padded(i)], expected[i], "{width:?} value {i}");
    }
    assert_eq!(total, xs.iter().sum::<u32>());
}

#[test]
fn padded_scan_all_widths() {
    padded_scan(WarpScanWidth::W32);
    padded_scan(WarpScanWidth::W64);
    padded_scan(WarpScanWidth::W128);
}
