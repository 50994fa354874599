// vim: tw=80
//! Zone reports and zone commands against a scripted zoned namespace

mod report {
    use crate::fake::{self, Layout, Zoned};
    use nvmio_core::{geo::GeoType, spec::*, znd, Error};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use rstest_reuse::{apply, template};

    const NZONE: u64 = 300;
    const NSECT: u64 = 16;

    #[template]
    #[rstest]
    #[case(0)]      // 1 MiB: everything in one command
    #[case(1)]      // 8 KiB: 127 descriptors per command
    fn transfer_limits(#[case] mdts: u8) {}

    #[apply(transfer_limits)]
    fn geometry(#[case] mdts: u8) {
        let dev = fake::open(Layout { mdts, ..Default::default() });
        assert_eq!(dev.csi().unwrap(), Csi::Zoned);
        let geo = dev.geo().unwrap();
        assert_eq!(geo.geo_type, GeoType::Zoned);
        assert_eq!(u64::from(geo.nzone), NZONE);
        assert_eq!(geo.nsect, NSECT);
        assert_eq!(geo.nbytes, 512);
        assert_eq!(znd::stat(&dev, ZND_RECV_SF_ALL).unwrap(), NZONE);
    }

    #[apply(transfer_limits)]
    fn whole_device(#[case] mdts: u8) {
        let dev = fake::open(Layout { mdts, ..Default::default() });
        let report = znd::report_from_dev(&dev, 0, 0, false).unwrap();
        assert_eq!(report.nzones, NZONE);
        assert_eq!(report.nentries, NZONE as usize);
        assert_eq!(report.zslba, 0);
        assert_eq!(report.zelba, (NZONE - 1) * NSECT);
        assert!(!report.extended);
        for (i, zd) in report.iter().enumerate() {
            assert_eq!(zd.zslba, i as u64 * NSECT);
            assert_eq!(zd.state(), Some(ZoneState::Empty));
        }
    }

    /// A small transfer limit splits the report, but doesn't change it
    #[test_log::test]
    fn chunked() {
        let small = fake::open(Layout { mdts: 1, ..Default::default() });
        let large = fake::open(Layout { mdts: 0, ..Default::default() });
        small.geo().unwrap();
        large.geo().unwrap();
        let small_before = small.state::<Zoned>().unwrap().recvs();
        let large_before = large.state::<Zoned>().unwrap().recvs();

        let chunked = znd::report_from_dev(&small, 0, 0, false).unwrap();
        let single = znd::report_from_dev(&large, 0, 0, false).unwrap();

        // 127 + 127 + 46
        assert_eq!(small.state::<Zoned>().unwrap().recvs() - small_before, 3);
        assert_eq!(large.state::<Zoned>().unwrap().recvs() - large_before, 1);
        assert_eq!(chunked, single);
    }

    /// A device that reports fewer zones than were asked for just takes
    /// more commands
    #[test_log::test]
    fn device_reports_fewer() {
        let dev = fake::open(Layout {
            mdts: 0,
            report_max: Some(100),
            ..Default::default()
        });
        dev.geo().unwrap();
        let before = dev.state::<Zoned>().unwrap().recvs();
        let report = znd::report_from_dev(&dev, 0, 0, false).unwrap();
        assert_eq!(dev.state::<Zoned>().unwrap().recvs() - before, 3);
        assert_eq!(report.nentries, NZONE as usize);
        let zslbas = report.iter().map(|zd| zd.zslba).collect::<Vec<_>>();
        let expected = (0..NZONE).map(|i| i * NSECT).collect::<Vec<_>>();
        assert_eq!(zslbas, expected);
    }

    /// The start LBA is rounded down to its zone
    #[test]
    fn partial_range() {
        let dev = fake::open(Layout::default());
        let report = znd::report_from_dev(&dev, 10 * NSECT + 5, 5, false)
            .unwrap();
        assert_eq!(report.zslba, 10 * NSECT);
        assert_eq!(report.zelba, 14 * NSECT);
        assert_eq!(report.nentries, 5);
        assert_eq!(report.descr(4).unwrap().zslba, 14 * NSECT);
        assert_eq!(report.descr(5), None);
    }

    #[rstest]
    #[case((NZONE - 1) * NSECT, 2)]
    #[case(NZONE * NSECT, 0)]
    #[case(NZONE * NSECT, 1)]
    fn out_of_range(#[case] slba: u64, #[case] limit: usize) {
        let dev = fake::open(Layout::default());
        let r = znd::report_from_dev(&dev, slba, limit, false);
        assert_eq!(r.unwrap_err(), Error::EINVAL);
    }

    #[apply(transfer_limits)]
    fn extended(#[case] mdts: u8) {
        let dev = fake::open(Layout { mdts, zdes: 1, ..Default::default() });
        let report = znd::report_from_dev(&dev, 0, 0, true).unwrap();
        assert!(report.extended);
        assert_eq!(report.zdext_nbytes, 64);
        assert_eq!(report.zrent_nbytes, 128);
        assert_eq!(report.nentries, NZONE as usize);
        for i in [0, 62, 63, 255, 299] {
            assert_eq!(report.descr(i).unwrap().zslba, i as u64 * NSECT);
            assert_eq!(report.ext(i).unwrap(), &[i as u8; 64][..]);
        }
    }

    #[test]
    fn extended_unsupported() {
        let dev = fake::open(Layout::default());
        dev.geo().unwrap();
        let before = dev.state::<Zoned>().unwrap().recvs();
        let r = znd::report_from_dev(&dev, 0, 0, true);
        assert_eq!(r.unwrap_err(), Error::ENOSYS);
        assert_eq!(dev.state::<Zoned>().unwrap().recvs(), before);
    }

    /// A device that answers no zoned identify is plain NVM
    #[test]
    fn not_zoned() {
        let dev = fake::open(Layout { plain: true, ..Default::default() });
        assert_eq!(dev.csi().unwrap(), Csi::Nvm);
        let geo = dev.geo().unwrap();
        assert_eq!(geo.geo_type, GeoType::Conventional);
        assert_eq!(geo.nlbas(), NZONE * NSECT);
        let r = znd::report_from_dev(&dev, 0, 0, false);
        assert_eq!(r.unwrap_err(), Error::EINVAL);
    }
}

mod commands {
    use crate::fake::{self, Layout, LBA_NBYTES};
    use nvmio_core::{cmd::CmdCtx, nvm, spec::*, znd, Error};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    const NSECT: u64 = 16;

    struct Harness {
        dev: nvmio_core::dev::Device,
    }

    #[fixture]
    fn harness() -> Harness {
        Harness { dev: fake::open(Layout::default()) }
    }

    #[rstest]
    fn write_moves_write_pointer(harness: Harness) {
        let mut ctx = CmdCtx::from_dev(&harness.dev);
        let mut wbuf = vec![0xA5u8; 2 * LBA_NBYTES];
        nvm::write(&mut ctx, 1, 3 * NSECT, 1, Some(&mut wbuf[..]), None)
            .unwrap();
        assert!(!ctx.cpl.is_err());

        let zd = znd::descr_from_dev(&harness.dev, 3 * NSECT + 7).unwrap();
        assert_eq!(zd.zslba, 3 * NSECT);
        assert_eq!(zd.wp, 3 * NSECT + 2);
        assert_eq!(zd.state(), Some(ZoneState::ImplicitlyOpen));

        let mut rbuf = vec![0u8; 2 * LBA_NBYTES];
        nvm::read(&mut ctx, 1, 3 * NSECT, 1, Some(&mut rbuf[..]), None)
            .unwrap();
        assert_eq!(rbuf, wbuf);
    }

    /// Writes anywhere but the write pointer fail in the completion
    #[rstest]
    fn write_off_pointer(harness: Harness) {
        let mut ctx = CmdCtx::from_dev(&harness.dev);
        let mut buf = vec![0u8; LBA_NBYTES];
        nvm::write(&mut ctx, 1, NSECT + 1, 0, Some(&mut buf[..]), None)
            .unwrap();
        assert!(ctx.cpl.is_err());
        assert_eq!(ctx.cpl.status.sct(), SCT_CMDSPEC);
    }

    #[rstest]
    fn append_returns_lba(harness: Harness) {
        let mut ctx = CmdCtx::from_dev(&harness.dev);
        let zslba = 2 * NSECT;
        let mut buf = vec![0x11u8; LBA_NBYTES];
        znd::append(&mut ctx, 1, zslba, 0, Some(&mut buf[..]), None).unwrap();
        assert_eq!(ctx.cpl.result(), zslba);
        znd::append(&mut ctx, 1, zslba, 0, Some(&mut buf[..]), None).unwrap();
        assert_eq!(ctx.cpl.result(), zslba + 1);
    }

    #[rstest]
    fn append_wrong_size(harness: Harness) {
        let mut ctx = CmdCtx::from_dev(&harness.dev);
        let mut buf = vec![0u8; LBA_NBYTES + 1];
        let r = znd::append(&mut ctx, 1, 0, 0, Some(&mut buf[..]), None);
        assert_eq!(r, Err(Error::EINVAL));
    }

    #[rstest]
    fn finish_then_find(harness: Harness) {
        let dev = &harness.dev;
        let mut ctx = CmdCtx::from_dev(dev);
        znd::mgmt_send(&mut ctx, 1, 5 * NSECT, false, ZND_SEND_FINISH, None)
            .unwrap();
        assert!(!ctx.cpl.is_err());

        let report = znd::report_from_dev(dev, 0, 0, false).unwrap();
        assert_eq!(znd::find_arbitrary(&report, ZoneState::Full, 0),
                   Ok(5 * NSECT));
        assert_eq!(znd::find_arbitrary(&report, ZoneState::Full, 1),
                   Err(Error::ENXIO));
        assert_eq!(znd::find_arbitrary(&report, ZoneState::Empty, 5),
                   Ok(6 * NSECT));
    }

    #[rstest]
    fn reset_all(harness: Harness) {
        let dev = &harness.dev;
        let mut ctx = CmdCtx::from_dev(dev);
        for zone in [0, 7, 42] {
            znd::mgmt_send(&mut ctx, 1, zone * NSECT, false, ZND_SEND_FINISH,
                           None).unwrap();
        }
        znd::mgmt_send(&mut ctx, 1, 0, true, ZND_SEND_RESET, None).unwrap();
        assert!(!ctx.cpl.is_err());

        let report = znd::report_from_dev(dev, 0, 0, false).unwrap();
        assert!(report.iter().all(|zd| {
            zd.state() == Some(ZoneState::Empty) && zd.wp == zd.zslba
        }));
        assert_eq!(znd::find_arbitrary(&report, ZoneState::Full, 0),
                   Err(Error::ENXIO));
    }

    /// Without descriptor extensions, there is nothing to send one with
    #[rstest]
    fn send_extension_unsupported(harness: Harness) {
        let mut ctx = CmdCtx::from_dev(&harness.dev);
        let mut ext = vec![0u8; 64];
        let r = znd::mgmt_send(&mut ctx, 1, 0, false, ZND_SEND_OPEN,
                               Some(&mut ext[..]));
        assert_eq!(r, Err(Error::EINVAL));
    }

    #[rstest]
    fn descr_past_end(harness: Harness) {
        let r = znd::descr_from_dev(&harness.dev, 300 * NSECT);
        assert_eq!(r.unwrap_err(), Error::EIO);
    }
}
