use anyhow::{bail, Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// Pixel layouts the capture path knows how to turn into RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb3,
    Yuyv,
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"RGB3" => Some(Self::Rgb3),
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }

    /// Convert one raw buffer of `width * height` pixels into packed RGB.
    pub fn to_rgb(self, width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
        let pixels = (width * height) as usize;
        let rgb = match self {
            Self::Rgb3 => {
                if data.len() < pixels * 3 {
                    bail!("short RGB3 buffer: {} < {}", data.len(), pixels * 3);
                }
                data[..pixels * 3].to_vec()
            }
            Self::Yuyv => yuyv_to_rgb(pixels, data)?,
            Self::Grey => {
                if data.len() < pixels {
                    bail!("short GREY buffer: {} < {}", data.len(), pixels);
                }
                data[..pixels].iter().flat_map(|&y| [y, y, y]).collect()
            }
        };
        RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| anyhow::anyhow!("failed to build {}x{} frame", width, height))
    }
}

/// Anything that hands out camera frames. An `Err` is a failed capture,
/// the next call may succeed.
pub trait FrameSource {
    fn frame(&mut self) -> Result<RgbImage>;
}

/// V4L2 capture device. The stream is released when the value is dropped.
pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device).with_context(|| format!("open camera {device}"))?;
        let mut fmt = dev.format().context("get format")?;

        // Prefer RGB3, then YUYV, else keep whatever the driver chose
        for fourcc in [b"RGB3", b"YUYV"] {
            if fmt.fourcc == FourCC::new(fourcc) {
                break;
            }
            let desired = Format::new(fmt.width, fmt.height, FourCC::new(fourcc));
            fmt = dev.set_format(&desired).unwrap_or(fmt);
        }

        let format = PixelFormat::from_fourcc(fmt.fourcc)
            .with_context(|| format!("unsupported pixel format {:?}", fmt.fourcc))?;
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        log::info!(
            "camera {}: {}x{} {:?}",
            device,
            fmt.width,
            fmt.height,
            format
        );

        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            format,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for Camera {
    /// Block until the next frame arrives and return it as RGB.
    fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!(
            "captured frame: {}x{} {:?} seq={} len={}",
            self.width,
            self.height,
            self.format,
            meta.sequence,
            data.len()
        );
        self.format.to_rgb(self.width, self.height, data)
    }
}

fn yuyv_to_rgb(pixels: usize, data: &[u8]) -> Result<Vec<u8>> {
    let expected = pixels * 2;
    if data.len() < expected {
        bail!("short YUYV buffer: {} < {}", data.len(), expected);
    }
    let mut out = Vec::with_capacity(pixels * 3);
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
