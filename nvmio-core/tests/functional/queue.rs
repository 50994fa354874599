// vim: tw=80
//! Asynchronous queues over real backends

mod ramdisk {
    use nvmio_core::{
        cmd::CmdCtx,
        dev::Device,
        nvm,
        opts::Opts,
        queue::Queue,
        spec::*,
        Error,
    };
    use pretty_assertions::assert_eq;
    use rand::{Rng, RngCore, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use rstest::{fixture, rstest};
    use std::{cell::RefCell, rc::Rc};

    struct Harness {
        dev: Device,
    }

    #[fixture]
    fn harness() -> Harness {
        let dev = Device::open("ram:1MB", &Opts::default()).unwrap();
        Harness { dev }
    }

    #[rstest]
    fn capacity(harness: Harness) {
        let r = Queue::init(&harness.dev, 17, 0);
        assert_eq!(r.unwrap_err(), Error::EINVAL);
        let q = Queue::init(&harness.dev, 16, 0).unwrap();
        assert_eq!(q.get_capacity(), 16);
        q.term().unwrap();
    }

    /// Data written through a queue is visible to synchronous reads
    #[rstest]
    fn async_write_sync_read(harness: Harness) {
        let dev = &harness.dev;
        let failures = Rc::new(RefCell::new(0));
        let mut q = Queue::init(dev, 16, 0).unwrap();
        let failures2 = failures.clone();
        q.set_cb(move |ctx, _| {
            if ctx.cpl.is_err() {
                *failures2.borrow_mut() += 1;
            }
        });
        for slba in 0..32u64 {
            if q.free_count() == 0 {
                q.poke(0).unwrap();
            }
            let mut ctx = q.get_cmd_ctx().unwrap();
            ctx.cmd = Cmd::nvm(NVM_OPC_WRITE, 1, slba, 0);
            let mut data = dev.buf_alloc(512).unwrap();
            data.fill(slba as u8 + 1);
            q.pass(ctx, Some(data), None).unwrap();
        }
        q.drain().unwrap();
        assert_eq!(*failures.borrow(), 0);
        assert_eq!(q.free_count(), 16);
        q.term().unwrap();

        let mut ctx = CmdCtx::from_dev(dev);
        let mut buf = vec![0u8; 32 * 512];
        nvm::read(&mut ctx, 1, 0, 31, Some(&mut buf[..]), None).unwrap();
        assert!(!ctx.cpl.is_err());
        for (i, block) in buf.chunks(512).enumerate() {
            assert!(block.iter().all(|&b| b == i as u8 + 1), "block {i}");
        }
    }

    /// Reads hand their buffers back through the callback
    #[rstest]
    fn async_read_payload(harness: Harness) {
        let dev = &harness.dev;
        let mut ctx = CmdCtx::from_dev(dev);
        let mut wbuf = vec![0x5Au8; 1024];
        nvm::write(&mut ctx, 1, 100, 1, Some(&mut wbuf[..]), None).unwrap();

        let got = Rc::new(RefCell::new(None));
        let mut q = Queue::init(dev, 4, 0).unwrap();
        let mut rctx = q.get_cmd_ctx().unwrap();
        rctx.cmd = Cmd::nvm(NVM_OPC_READ, 1, 100, 1);
        let got2 = got.clone();
        rctx.set_cb(move |_, payload| {
            *got2.borrow_mut() = payload.into_data().map(|b| b.to_vec());
        });
        q.pass(rctx, Some(dev.buf_alloc(1024).unwrap()), None).unwrap();
        assert_eq!(q.drain(), Ok(1));
        assert_eq!(got.borrow().as_deref(), Some(&wbuf[..]));
    }

    /// Random-sized writes at random places, read back synchronously
    #[rstest]
    fn random_writes(harness: Harness) {
        let dev = &harness.dev;
        let mut rng = XorShiftRng::seed_from_u64(12345);
        let mut shadow = vec![0u8; 1 << 20];
        let mut q = Queue::init(dev, 8, 0).unwrap();
        q.set_cb(|ctx, _| assert!(!ctx.cpl.is_err()));
        for _ in 0..64 {
            let nlb = rng.gen_range(0..8u16);
            let slba = rng.gen_range(0..(2048 - u64::from(nlb)));
            let nbytes = (usize::from(nlb) + 1) * 512;
            let mut data = dev.buf_alloc(nbytes).unwrap();
            rng.fill_bytes(&mut data[..]);
            let ofs = slba as usize * 512;
            shadow[ofs..ofs + nbytes].copy_from_slice(&data[..]);
            if q.free_count() == 0 {
                q.poke(0).unwrap();
            }
            let mut ctx = q.get_cmd_ctx().unwrap();
            ctx.cmd = Cmd::nvm(NVM_OPC_WRITE, 1, slba, nlb);
            q.pass(ctx, Some(data), None).unwrap();
        }
        q.drain().unwrap();
        q.term().unwrap();

        let mut ctx = CmdCtx::from_dev(dev);
        let mut buf = vec![0u8; 128 * 512];
        for slba in (0..2048u64).step_by(128) {
            nvm::read(&mut ctx, 1, slba, 127, Some(&mut buf[..]), None)
                .unwrap();
            let ofs = slba as usize * 512;
            assert!(buf == shadow[ofs..ofs + buf.len()], "slba {slba}");
        }
    }

    /// A context only goes back to the queue it came from
    #[rstest]
    fn other_queues_context(harness: Harness) {
        let dev = &harness.dev;
        let mut q1 = Queue::init(dev, 1, 0).unwrap();
        let mut q2 = Queue::init(dev, 1, 0).unwrap();
        q2.set_cb(|_, _| ());
        let mut ctx = q1.get_cmd_ctx().unwrap();
        ctx.cmd = Cmd::flush(1);

        let rejected = q2.pass(ctx, None, None).unwrap_err();
        assert_eq!(rejected.error, Error::EINVAL);
        assert_eq!(q2.get_outstanding(), 0);
        q1.put_cmd_ctx(rejected.ctx).unwrap();
        assert_eq!(q1.free_count(), 1);

        let ctx = q1.get_cmd_ctx().unwrap();
        assert_eq!(q2.put_cmd_ctx(ctx).unwrap_err(), Error::EINVAL);
        assert_eq!(q2.free_count(), 1);
        let own = q2.get_cmd_ctx().unwrap();
        q2.put_cmd_ctx(own).unwrap();
        q2.term().unwrap();
        q1.term().unwrap();
    }

    /// A rejected submission returns the context, which can be retried
    #[rstest]
    fn rejected_retry(harness: Harness) {
        let dev = &harness.dev;
        let mut q = Queue::init(dev, 1, 0).unwrap();
        q.set_cb(|_, _| ());
        let foreign = CmdCtx::from_dev(dev);
        let rejected = q.pass(foreign, None, None).unwrap_err();
        assert_eq!(rejected.error, Error::EINVAL);
        assert!(!rejected.ctx.is_async());

        let mut ctx = q.get_cmd_ctx().unwrap();
        ctx.cmd = Cmd::flush(1);
        q.pass(ctx, None, None).unwrap();
        assert_eq!(q.drain(), Ok(1));
    }
}

mod zoned {
    use crate::fake::{self, Layout, LBA_NBYTES};
    use nvmio_core::{queue::Queue, spec::*};
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, rc::Rc};

    /// Appends through a queue report where they landed
    #[test]
    fn append() {
        let dev = fake::open(Layout::default());
        let zslba = 4 * 16;
        let lbas = Rc::new(RefCell::new(Vec::new()));
        let mut q = Queue::init(&dev, 8, 0).unwrap();
        let lbas2 = lbas.clone();
        q.set_cb(move |ctx, _| {
            assert!(!ctx.cpl.is_err());
            lbas2.borrow_mut().push(ctx.cpl.result());
        });
        for _ in 0..4 {
            let mut ctx = q.get_cmd_ctx().unwrap();
            ctx.cmd = Cmd::append(1, zslba, 1);
            let data = dev.buf_alloc(2 * LBA_NBYTES).unwrap();
            q.pass(ctx, Some(data), None).unwrap();
        }
        q.drain().unwrap();
        assert_eq!(*lbas.borrow(), vec![zslba, zslba + 2, zslba + 4,
                                         zslba + 6]);
    }
}
