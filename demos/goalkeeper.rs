use gkview::{Config, GoalkeeperPipeline, OutputSource, ReplayDetector, SphericalFrame, ViewImage};
use opencv::{core::Mat, prelude::*, videoio};
use tracing_subscriber::EnvFilter;

pub struct VideoWriter {
    writer: Option<videoio::VideoWriter>,
    size: Option<(i32, i32)>,
    fps: f64,
    out_file: String,
}

impl VideoWriter {
    pub fn new<S: ToString>(out_file: S, fps: f64) -> Self {
        Self {
            writer: None,
            size: None,
            fps,
            out_file: out_file.to_string(),
        }
    }

    pub fn release(&mut self) -> opencv::Result<()> {
        if let Some(mut w) = self.writer.take() {
            w.release()?;
        }

        Ok(())
    }

    fn reinit(&mut self, size: (i32, i32)) -> opencv::Result<()> {
        self.release()?;

        self.size = Some(size);
        self.writer = Some(videoio::VideoWriter::new(
            &self.out_file,
            videoio::VideoWriter::fourcc(b'm' as _, b'p' as _, b'4' as _, b'v' as _)?,
            self.fps,
            opencv::core::Size::new(size.0, size.1),
            true,
        )?);

        Ok(())
    }

    pub fn feed(&mut self, image: &ViewImage) -> Result<(), gkview::Error> {
        let (h, w, c) = image.dim();
        let size = (w as i32, h as i32);

        if self.writer.is_none() || self.size != Some(size) {
            self.reinit(size)?;
        }

        let bytes = image.as_standard_layout();
        let bytes = bytes
            .as_slice()
            .ok_or_else(|| gkview::Error::Config("output image not contiguous".into()))?;
        let mat = Mat::from_slice(bytes)?.reshape(c as i32, h as i32)?;

        if let Some(writer) = self.writer.as_mut() {
            writer.write(&mat)?;
        }

        Ok(())
    }
}

fn to_spherical(mat: &Mat) -> Result<SphericalFrame, gkview::Error> {
    let (rows, cols, channels) = (mat.rows() as usize, mat.cols() as usize, mat.channels() as usize);
    let data = mat.data_bytes()?.to_vec();

    SphericalFrame::from_raw(cols, rows, channels, data)
}

fn main() -> Result<(), gkview::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let in_file_name = args.next().expect("expected video file name");
    let dets_file_name = args.next().expect("expected detections file");
    let out_file_name = args.next().unwrap_or_else(|| "out.mp4".to_string());

    let config = match args.next() {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    let mut detector = ReplayDetector::from_file(&dets_file_name)?;
    let mut pipeline = GoalkeeperPipeline::new(&config)?;

    let mut cam = videoio::VideoCapture::from_file(&in_file_name, videoio::CAP_ANY)?;
    if !videoio::VideoCapture::is_opened(&cam)? {
        panic!("Unable to open {}", in_file_name);
    }

    let fps = cam.get(videoio::CAP_PROP_FPS)?;
    let total = cam.get(videoio::CAP_PROP_FRAME_COUNT)? as i64;
    let mut writer = VideoWriter::new(&out_file_name, if fps > 0.0 { fps } else { 30.0 });

    println!(
        "processing {} frames, rendering on {}",
        total,
        pipeline.sampler().strategy_name()
    );

    let start = std::time::Instant::now();
    let mut frame = Mat::default();
    let mut tracked = 0;

    loop {
        if !cam.read(&mut frame)? || frame.cols() == 0 || frame.rows() == 0 {
            break;
        }

        let sphere = to_spherical(&frame)?;
        let out = pipeline.process(&sphere, &mut detector)?;
        if out.source == OutputSource::Tracked {
            tracked += 1;
        }

        writer.feed(&out.image)?;

        let idx = pipeline.frame_index();
        if idx % 30 == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            print!(
                "\rprogress {}/{} ({:.1} fps)...",
                idx,
                total,
                idx as f64 / elapsed.max(1e-6)
            );
        }
    }

    writer.release()?;

    println!(
        "\nfinished {} frames ({} tracked) in {:.2}s",
        pipeline.frame_index(),
        tracked,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
