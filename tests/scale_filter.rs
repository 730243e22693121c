//! End-to-end scale filter tests on the software runtime

use ghostscale::amf::{
    self, alloc_planes, AmfResult, Component, Context, D3d11Texture, Data, Factory, NativeDevice,
    Status, SurfaceFormat, Variant,
};
use ghostscale::filter::ContextSource;
use ghostscale::frame::{FrameBuffer, HwPayload};
use ghostscale::hwcontext::{DeviceContext, FramePool, FramePoolDesc};
use ghostscale::types::{ColorRange, ColorSpace};
use ghostscale::{
    ColorProfile, Error, Frame, HwDevice, HwDeviceType, InputLink, PixelFormat, Rational,
    RangeOverride, ScaleConfig, ScaleFilter, SoftwareFactory,
};

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn gradient(format: PixelFormat, w: u32, h: u32) -> Frame {
    let mut frame = Frame::new_host(format, w, h);
    for (p, plane) in frame.planes.iter_mut().enumerate() {
        for (i, b) in plane.data.iter_mut().enumerate() {
            *b = ((i * 7 + p * 31) % 251) as u8;
        }
    }
    frame
}

fn configured(config: ScaleConfig, link: &InputLink) -> (ScaleFilter, Arc<amf::software::SurfaceStats>) {
    let factory = Arc::new(SoftwareFactory::new());
    let stats = factory.stats();
    let mut filter = ScaleFilter::init(config, factory).unwrap();
    let out_format = filter.preferred_output_format(link).unwrap();
    filter.config_output(link, out_format).unwrap();
    (filter, stats)
}

#[test]
fn half_size_nv12_keeps_display_aspect() {
    let link = InputLink::host(PixelFormat::Nv12, 1920, 1080)
        .with_sample_aspect_ratio(Rational::new(4, 3));
    let (mut filter, _) = configured(
        ScaleConfig::default()
            .with_size("iw/2", "ih/2")
            .with_format(PixelFormat::Nv12),
        &link,
    );

    let output = filter.output().unwrap().clone();
    assert_eq!((output.width, output.height), (960, 540));
    assert_eq!(output.format, PixelFormat::Nv12);
    assert_eq!(output.sample_aspect_ratio, Rational::new(4, 3));

    let mut frame = gradient(PixelFormat::Nv12, 1920, 1080);
    frame.sample_aspect_ratio = Rational::new(4, 3);
    frame.pts = 3003;
    let out = filter.filter_frame(frame).unwrap();

    assert_eq!((out.width, out.height), (960, 540));
    assert_eq!(out.format, PixelFormat::Nv12);
    assert_eq!(out.pts, 3003);
    // (540 * 1920) / (960 * 1080) == 1
    assert_eq!(out.sample_aspect_ratio, Rational::new(4, 3));
    assert_eq!(out.planes[0].data.len(), 960 * 540);
    assert_eq!(out.planes[1].data.len(), 960 * 270);
}

#[test]
fn anamorphic_resize_scales_sar() {
    let link = InputLink::host(PixelFormat::Nv12, 64, 32);
    let (mut filter, _) = configured(ScaleConfig::default().with_size("32", "32"), &link);

    let mut frame = gradient(PixelFormat::Nv12, 64, 32);
    frame.sample_aspect_ratio = Rational::new(1, 1);
    let out = filter.filter_frame(frame).unwrap();
    assert_eq!(out.sample_aspect_ratio, Rational::new(2, 1));

    let frame = gradient(PixelFormat::Nv12, 64, 32);
    let out = filter.filter_frame(frame).unwrap();
    assert_eq!(out.sample_aspect_ratio, Rational::UNSET);
}

#[test]
fn identity_round_trip_is_lossless() {
    for format in [PixelFormat::Nv12, PixelFormat::Bgra, PixelFormat::Yuv420p] {
        let link = InputLink::host(format, 34, 18);
        let (mut filter, _) = configured(ScaleConfig::default(), &link);
        let frame = gradient(format, 34, 18);
        let expected = frame.planes.clone();
        let out = filter.filter_frame(frame).unwrap();
        assert_eq!(out.format, format);
        assert_eq!(out.planes, expected, "{} planes differ", format);
    }
}

#[test]
fn every_surface_is_released() {
    const N: usize = 12;
    let link = InputLink::host(PixelFormat::Nv12, 32, 32);
    let factory = Arc::new(SoftwareFactory::new());
    let stats = factory.stats();
    let mut filter =
        ScaleFilter::init(ScaleConfig::default().with_size("16", "16"), factory).unwrap();
    filter.config_output(&link, PixelFormat::Amf).unwrap();

    let mut outputs = Vec::new();
    for pts in 0..N {
        let mut frame = gradient(PixelFormat::Nv12, 32, 32);
        frame.pts = pts as i64;
        outputs.push(filter.filter_frame(frame).unwrap());
    }

    // Only the output surfaces are still referenced
    assert_eq!(stats.live(), N as u64);
    for out in &outputs {
        match &out.hw {
            Some(HwPayload::Amf(buffer)) => assert!(buffer.is_live()),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(out.hw_frames.as_ref().unwrap().format(), PixelFormat::Amf);
    }

    drop(outputs);
    drop(filter);
    assert_eq!(stats.live(), 0);
    assert_eq!(stats.created(), stats.released());
    assert_eq!(stats.created(), 2 * N as u64);
}

#[test]
fn host_output_releases_surface_immediately() {
    let link = InputLink::host(PixelFormat::Nv12, 16, 16);
    let (mut filter, stats) = configured(
        ScaleConfig::default().with_format(PixelFormat::Bgra),
        &link,
    );
    let out = filter.filter_frame(gradient(PixelFormat::Nv12, 16, 16)).unwrap();
    assert_eq!(out.format, PixelFormat::Bgra);
    assert!(!out.is_hardware());
    assert_eq!(stats.live(), 0);
    assert_eq!(stats.created(), 2);
}

#[test]
fn unset_color_fields_come_from_input() {
    let link = InputLink::host(PixelFormat::Nv12, 8, 8);
    let (mut filter, _) = configured(ScaleConfig::default(), &link);

    let mut frame = gradient(PixelFormat::Nv12, 8, 8);
    frame.color_range = ColorRange::Limited;
    frame.colorspace = ColorSpace::Bt470bg;
    let out = filter.filter_frame(frame).unwrap();
    assert_eq!(out.color_range, ColorRange::Limited);
    assert_eq!(out.colorspace, ColorSpace::Bt470bg);
}

#[test]
fn configured_color_fields_override() {
    let link = InputLink::host(PixelFormat::Nv12, 8, 8);
    let (mut filter, _) = configured(
        ScaleConfig::default()
            .with_color_profile(ColorProfile::Bt709)
            .with_color_range(RangeOverride::Full),
        &link,
    );

    let mut frame = gradient(PixelFormat::Nv12, 8, 8);
    frame.color_range = ColorRange::Limited;
    frame.colorspace = ColorSpace::Bt470bg;
    let out = filter.filter_frame(frame).unwrap();
    assert_eq!(out.colorspace, ColorSpace::Bt709);
    assert_eq!(out.color_range, ColorRange::Full);
}

/// Converter call that fails
#[derive(Clone, Copy)]
enum FailAt {
    Submit,
    Query,
}

/// Runtime whose converter fails every frame
struct FailingFactory {
    inner: SoftwareFactory,
    fail_at: FailAt,
}

struct FailingComponent {
    fail_at: FailAt,
}

impl Component for FailingComponent {
    fn set_property(&mut self, _name: &'static str, _value: Variant) -> AmfResult<()> {
        Ok(())
    }

    fn get_property(&self, _name: &str) -> Option<Variant> {
        None
    }

    fn init(&mut self, _format: SurfaceFormat, _width: i32, _height: i32) -> AmfResult<()> {
        Ok(())
    }

    fn submit_input(&mut self, _data: Data) -> AmfResult<()> {
        match self.fail_at {
            FailAt::Submit => Err(Status::FAIL),
            FailAt::Query => Ok(()),
        }
    }

    fn query_output(&mut self) -> AmfResult<Data> {
        match self.fail_at {
            FailAt::Submit => Err(Status::REPEAT),
            FailAt::Query => Err(Status::FAIL),
        }
    }

    fn terminate(&mut self) -> AmfResult<()> {
        Ok(())
    }
}

impl Factory for FailingFactory {
    fn name(&self) -> &str {
        "failing"
    }

    fn create_context(&self) -> AmfResult<Arc<dyn Context>> {
        self.inner.create_context()
    }

    fn derive_context(&self, device: &NativeDevice) -> AmfResult<Arc<dyn Context>> {
        self.inner.derive_context(device)
    }

    fn create_component(
        &self,
        _context: &Arc<dyn Context>,
        _id: &str,
    ) -> AmfResult<Box<dyn Component>> {
        Ok(Box::new(FailingComponent {
            fail_at: self.fail_at,
        }))
    }
}

/// Push one accelerator frame through a converter failing at `fail_at`.
/// Returns the error, the number of input releases and the live surfaces.
fn run_failing(fail_at: FailAt) -> (Error, usize, u64) {
    let inner = SoftwareFactory::new();
    let stats = inner.stats();
    let factory: Arc<dyn Factory> = Arc::new(FailingFactory { inner, fail_at });

    // Upstream stage producing accelerator surfaces
    let upstream = DeviceContext::create(factory.clone()).unwrap();
    let pool = FramePool::init(
        HwDevice::accelerator(upstream.clone()),
        FramePoolDesc {
            format: PixelFormat::Amf,
            sw_format: PixelFormat::Nv12,
            width: 16,
            height: 16,
        },
    )
    .unwrap();

    let mut filter = ScaleFilter::init(ScaleConfig::default(), factory).unwrap();
    let link = InputLink::from_pool(pool.clone());
    filter.config_output(&link, PixelFormat::Amf).unwrap();
    assert!(matches!(
        filter.context_source(),
        Some(ContextSource::InputPool { .. })
    ));

    let releases = Arc::new(AtomicUsize::new(0));
    let counter = releases.clone();
    let surface = upstream
        .context()
        .alloc_surface(amf::MemoryType::Host, SurfaceFormat::Nv12, 16, 16)
        .unwrap();
    let mut frame = pool.get_buffer();
    frame.hw = Some(HwPayload::Amf(FrameBuffer::with_release(surface, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })));

    let mut forwarded = Vec::new();
    let err = filter
        .run(vec![frame], |out| {
            forwarded.push(out);
            Ok(())
        })
        .unwrap_err();
    assert!(forwarded.is_empty());

    drop(filter);
    drop(pool);
    (err, releases.load(Ordering::SeqCst), stats.live())
}

#[test]
fn failed_submit_releases_input_once() {
    let (err, releases, live) = run_failing(FailAt::Submit);
    match err {
        Error::OperationFailed { op, status } => {
            assert_eq!(op, "SubmitInput");
            assert_eq!(status, Status::FAIL);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(releases, 1);
    assert_eq!(live, 0);
}

#[test]
fn failed_query_releases_input_once() {
    let (err, releases, live) = run_failing(FailAt::Query);
    assert!(err.is_recoverable());
    match err {
        Error::OperationFailed { op, status } => {
            assert_eq!(op, "QueryOutput");
            assert_eq!(status, Status::FAIL);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(releases, 1);
    assert_eq!(live, 0);
}

#[test]
fn d3d11_input_reads_tagged_slice() {
    let device = HwDevice::native(HwDeviceType::D3d11va, 0x1000);
    let in_pool = FramePool::init(
        device,
        FramePoolDesc {
            format: PixelFormat::D3d11,
            sw_format: PixelFormat::Nv12,
            width: 16,
            height: 16,
        },
    )
    .unwrap();

    // Three slices, only slice 2 carries a pattern
    let mut slices = Vec::new();
    for index in 0..3u8 {
        let mut planes = alloc_planes(SurfaceFormat::Nv12, 16, 16).unwrap();
        for plane in planes.iter_mut() {
            for y in 0..plane.rows {
                for (x, b) in plane.row_mut(y).iter_mut().enumerate() {
                    *b = if index == 2 { (x + y * 3) as u8 } else { 0 };
                }
            }
        }
        slices.push(planes);
    }
    let texture = D3d11Texture::new(0xd3d, SurfaceFormat::Nv12, 16, 16, slices);

    let factory = Arc::new(SoftwareFactory::new());
    let stats = factory.stats();
    let mut filter = ScaleFilter::init(ScaleConfig::default(), factory).unwrap();
    let link = InputLink::from_pool(in_pool.clone());
    let output = filter.config_output(&link, PixelFormat::D3d11).unwrap();
    assert_eq!(output.format, PixelFormat::D3d11);
    assert!(Arc::ptr_eq(output.hw_frames.device(), in_pool.device()));

    let mut frame = in_pool.get_buffer();
    frame.hw = Some(HwPayload::D3d11 {
        texture: texture.clone(),
        index: 2,
    });
    let out = filter.filter_frame(frame).unwrap();

    let out_texture = match &out.hw {
        Some(HwPayload::D3d11 { texture, index }) => {
            assert_eq!(*index, 0);
            texture.clone()
        }
        other => panic!("unexpected payload {:?}", other),
    };
    assert!(out.backing.as_ref().unwrap().is_live());

    let expected = texture.slice(2).unwrap();
    let expected = expected.lock();
    let actual = out_texture.slice(0).unwrap();
    let actual = actual.lock();
    for (want, got) in expected.iter().zip(actual.iter()) {
        for y in 0..want.rows {
            assert_eq!(want.row(y), got.row(y));
        }
    }
    drop(actual);
    drop(expected);

    drop(out);
    drop(filter);
    assert_eq!(stats.live(), 0);
}

#[test]
fn bound_device_selects_native_format() {
    let device = HwDevice::native(HwDeviceType::Dxva2, 0x77);
    let factory = Arc::new(SoftwareFactory::new());
    let stats = factory.stats();
    let mut filter = ScaleFilter::init(ScaleConfig::default().with_size("8", "8"), factory)
        .unwrap()
        .with_device(device);

    let lists = filter.query_formats().unwrap();
    assert_eq!(lists.output, vec![PixelFormat::Dxva2Vld]);
    assert_eq!(lists.input[0], PixelFormat::Dxva2Vld);

    let link = InputLink::host(PixelFormat::Nv12, 16, 16);
    let output = filter
        .config_output(&link, PixelFormat::Dxva2Vld)
        .unwrap();
    assert_eq!(output.format, PixelFormat::Amf);

    let out = filter.filter_frame(gradient(PixelFormat::Nv12, 16, 16)).unwrap();
    let buffer = match &out.hw {
        Some(HwPayload::Amf(buffer)) => buffer.clone(),
        other => panic!("unexpected payload {:?}", other),
    };
    let surface = buffer.surface().unwrap();
    assert_eq!(surface.memory_type(), amf::MemoryType::Dx9);
    assert_eq!((surface.width(), surface.height()), (8, 8));
    drop(surface);

    buffer.release();
    assert_eq!(stats.live(), 0);
}

#[test]
fn unsupported_bound_device_fails_negotiation() {
    let filter = ScaleFilter::init(ScaleConfig::default(), Arc::new(SoftwareFactory::new()))
        .unwrap()
        .with_device(HwDevice::native(HwDeviceType::Cuda, 1));
    assert!(matches!(
        filter.query_formats(),
        Err(Error::UnsupportedDevice(_))
    ));
}

#[test]
fn config_file_drives_filter() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
w = "iw/2"
h = "-2"
format = "bgra"
scale-type = "bicubic"
color-profile = "bt601"
color-range = "full"
force-original-aspect-ratio = "decrease"
force-divisible-by = 4
"#
    )
    .unwrap();

    let config = ScaleConfig::load(file.path()).unwrap();
    assert_eq!(config.format, Some(PixelFormat::Bgra));

    let link = InputLink::host(PixelFormat::Nv12, 100, 60);
    let (mut filter, _) = configured(config, &link);
    let output = filter.output().unwrap().clone();
    assert_eq!(output.format, PixelFormat::Bgra);
    assert_eq!(output.width % 4, 0);
    assert_eq!(output.height % 4, 0);
    assert_eq!((output.width, output.height), (48, 28));

    let out = filter.filter_frame(gradient(PixelFormat::Nv12, 100, 60)).unwrap();
    assert_eq!(out.planes[0].data.len(), 48 * 4 * 28);
    assert_eq!(out.colorspace, ColorSpace::Smpte170m);
    assert_eq!(out.color_range, ColorRange::Full);
}

#[test]
fn invalid_config_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "force-divisible-by = 0").unwrap();
    let err = ScaleConfig::load(file.path()).unwrap_err();
    assert!(err.is_configuration_error());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "scale-type = \"lanczos\"").unwrap();
    assert!(matches!(
        ScaleConfig::load(file.path()),
        Err(Error::ConfigFile(_))
    ));
}

#[test]
fn padded_d3d11_texture_scales_to_host_bgra() {
    let device = HwDevice::native(HwDeviceType::D3d11va, 0x2000);
    let in_pool = FramePool::init(
        device,
        FramePoolDesc {
            format: PixelFormat::D3d11,
            sw_format: PixelFormat::Nv12,
            width: 16,
            height: 16,
        },
    )
    .unwrap();

    // Texture rows past the 10-row picture are padding
    let mut planes = alloc_planes(SurfaceFormat::Nv12, 16, 16).unwrap();
    for (p, plane) in planes.iter_mut().enumerate() {
        for y in 0..plane.rows {
            plane.row_mut(y).fill(if p == 0 { 120 } else { 128 });
        }
    }
    let texture = D3d11Texture::new(0xd3e, SurfaceFormat::Nv12, 16, 16, vec![planes]);

    let factory = Arc::new(SoftwareFactory::new());
    let stats = factory.stats();
    let mut filter = ScaleFilter::init(
        ScaleConfig::default()
            .with_size("8", "6")
            .with_format(PixelFormat::Bgra),
        factory,
    )
    .unwrap();
    let mut link = InputLink::from_pool(in_pool.clone());
    link.height = 10;
    let output = filter.config_output(&link, PixelFormat::Bgra).unwrap();
    assert_eq!((output.width, output.height), (8, 6));

    let mut frame = in_pool.get_buffer();
    frame.height = 10;
    frame.hw = Some(HwPayload::D3d11 { texture, index: 0 });
    let out = filter.filter_frame(frame).unwrap();

    assert_eq!(out.format, PixelFormat::Bgra);
    assert_eq!(out.planes[0].data.len(), 8 * 4 * 6);
    assert!(out.planes[0].data.chunks(4).all(|px| px[3] == 255));
    drop(out);
    drop(filter);
    assert_eq!(stats.live(), 0);
}

#[test]
fn output_color_range_changes_rgb_pixels() {
    let grey = |range: RangeOverride| {
        let link = InputLink::host(PixelFormat::Nv12, 16, 16);
        let (mut filter, _) = configured(
            ScaleConfig::default()
                .with_format(PixelFormat::Bgra)
                .with_color_profile(ColorProfile::Bt709)
                .with_color_range(range),
            &link,
        );
        let mut frame = Frame::new_host(PixelFormat::Nv12, 16, 16);
        frame.planes[0].data.fill(200);
        frame.planes[1].data.fill(128);
        let out = filter.filter_frame(frame).unwrap();
        // Green channel of a pixel in the middle
        out.planes[0].data[8 * 16 * 4 + 8 * 4 + 1]
    };

    let studio = grey(RangeOverride::Studio);
    let full = grey(RangeOverride::Full);
    assert!((212..=216).contains(&studio), "studio grey {}", studio);
    assert!((198..=202).contains(&full), "full grey {}", full);
}
