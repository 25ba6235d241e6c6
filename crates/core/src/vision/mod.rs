use std::path::Path;

use opencv::{
    core::{Mat, Point, Rect, Scalar, Size, Vector, CV_32F},
    dnn, highgui, imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
    videoio::{self, VideoCapture},
};

use crate::{
    CameraConfig, CaptureLoop, Command, DetectionParams, EmotionClassifier, EmotionLabel,
    EmotionScores, FaceDetector, FaceRegion, FrameSource, MoodTunesError, OutputSurface, Result,
};

/// Side length of the square grayscale input the emotion model expects.
const EMOTION_INPUT_SIZE: i32 = 64;

/// Output order of the FER+ emotion model.
const EMOTION_CLASSES: [&str; 8] = [
    EmotionLabel::NEUTRAL,
    EmotionLabel::HAPPY,
    EmotionLabel::SURPRISED,
    EmotionLabel::SAD,
    EmotionLabel::ANGRY,
    "disgust",
    "fear",
    "contempt",
];

pub type OpenCvCaptureLoop =
    CaptureLoop<OpenCvCamera, HaarFaceDetector, DnnEmotionClassifier, HighGuiSurface>;

/// Opens the camera, loads both models and creates the display window. These
/// are the OpenCV-backed collaborators of the capture loop.
pub fn open_capture_loop(config: &CameraConfig) -> Result<OpenCvCaptureLoop> {
    let camera = OpenCvCamera::open(config.device_index)?;
    let detector = HaarFaceDetector::load(&config.cascade_path)?;
    let classifier = DnnEmotionClassifier::load(&config.emotion_model_path)?;
    let surface = HighGuiSurface::open(&config.window_title)?;
    Ok(CaptureLoop::new(camera, detector, classifier, surface))
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| MoodTunesError::Config(format!("non UTF-8 path {}", path.display())))
}

#[derive(Debug)]
pub struct OpenCvCamera {
    capture: VideoCapture,
    index: i32,
}

impl OpenCvCamera {
    pub fn open(index: i32) -> Result<Self> {
        let capture = VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|err| MoodTunesError::DeviceUnavailable(format!("camera {index}: {err}")))?;
        let opened = capture
            .is_opened()
            .map_err(|err| MoodTunesError::DeviceUnavailable(format!("camera {index}: {err}")))?;
        if !opened {
            return Err(MoodTunesError::DeviceUnavailable(format!(
                "camera {index} could not be opened"
            )));
        }

        tracing::info!(index, "camera opened");
        Ok(Self { capture, index })
    }
}

impl FrameSource for OpenCvCamera {
    type Frame = Mat;

    fn read_frame(&mut self) -> Option<Mat> {
        let mut frame = Mat::default();
        match self.capture.read(&mut frame) {
            Ok(true) if !frame.empty() => Some(frame),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(index = self.index, %err, "frame read failed");
                None
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        self.capture.release()?;
        tracing::info!(index = self.index, "camera released");
        Ok(())
    }
}

/// Frontal face detector backed by a Haar cascade.
pub struct HaarFaceDetector {
    cascade: CascadeClassifier,
}

impl HaarFaceDetector {
    pub fn load(path: &Path) -> Result<Self> {
        let cascade = CascadeClassifier::new(path_str(path)?)?;
        if cascade.empty()? {
            return Err(MoodTunesError::Vision(format!(
                "failed to load face cascade from {}",
                path.display()
            )));
        }
        Ok(Self { cascade })
    }
}

impl FaceDetector<Mat> for HaarFaceDetector {
    fn detect(&mut self, frame: &Mat, params: &DetectionParams) -> Result<Vec<FaceRegion>> {
        let mut gray = Mat::default();
        imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let mut faces = Vector::<Rect>::new();
        self.cascade.detect_multi_scale(
            &gray,
            &mut faces,
            params.scale_factor,
            params.min_neighbors,
            0,
            Size::new(params.min_size.0, params.min_size.1),
            Size::new(0, 0),
        )?;

        Ok(faces
            .iter()
            .map(|rect| FaceRegion::new(rect.x, rect.y, rect.width, rect.height))
            .collect())
    }
}

/// Emotion classifier running a FER+ style ONNX model through OpenCV DNN.
pub struct DnnEmotionClassifier {
    net: dnn::Net,
}

impl DnnEmotionClassifier {
    pub fn load(path: &Path) -> Result<Self> {
        let net = dnn::read_net_from_onnx(path_str(path)?)?;
        if net.empty()? {
            return Err(MoodTunesError::Vision(format!(
                "failed to load emotion model from {}",
                path.display()
            )));
        }
        Ok(Self { net })
    }
}

impl EmotionClassifier<Mat> for DnnEmotionClassifier {
    fn classify(&mut self, frame: &Mat, face: &FaceRegion) -> Result<EmotionScores> {
        let Some(rect) = clip_to_frame(face, frame.cols(), frame.rows()) else {
            return Ok(EmotionScores::new());
        };

        let roi = Mat::roi(frame, rect)?;
        let mut gray = Mat::default();
        imgproc::cvt_color(&roi, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let blob = dnn::blob_from_image(
            &gray,
            1.0,
            Size::new(EMOTION_INPUT_SIZE, EMOTION_INPUT_SIZE),
            Scalar::default(),
            false,
            false,
            CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;
        let logits = output.data_typed::<f32>()?;

        if logits.len() != EMOTION_CLASSES.len() {
            tracing::warn!(outputs = logits.len(), "unexpected emotion model output size");
            return Ok(EmotionScores::new());
        }

        Ok(EMOTION_CLASSES
            .iter()
            .copied()
            .zip(softmax(logits))
            .collect())
    }
}

fn clip_to_frame(face: &FaceRegion, cols: i32, rows: i32) -> Option<Rect> {
    let x0 = face.x.clamp(0, cols);
    let y0 = face.y.clamp(0, rows);
    let x1 = (face.x + face.width).clamp(0, cols);
    let y1 = (face.y + face.height).clamp(0, rows);
    (x1 > x0 && y1 > y0).then(|| Rect::new(x0, y0, x1 - x0, y1 - y0))
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|value| (value - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= f32::EPSILON {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|value| value / sum).collect()
}

/// HighGUI window that shows annotated frames and reads `s` / `q`.
#[derive(Debug)]
pub struct HighGuiSurface {
    window: String,
}

impl HighGuiSurface {
    pub fn open(title: &str) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            window: title.to_string(),
        })
    }
}

impl OutputSurface<Mat> for HighGuiSurface {
    fn annotate(
        &mut self,
        frame: &mut Mat,
        face: &FaceRegion,
        label: Option<&EmotionLabel>,
    ) -> Result<()> {
        if let Some(label) = label {
            imgproc::put_text(
                frame,
                &format!("Emotion: {label}"),
                Point::new(face.x, face.y - 10),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.9,
                Scalar::new(255.0, 0.0, 0.0, 0.0),
                2,
                imgproc::LINE_8,
                false,
            )?;
        }

        imgproc::rectangle(
            frame,
            Rect::new(face.x, face.y, face.width, face.height),
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            imgproc::LINE_8,
            0,
        )?;
        Ok(())
    }

    fn present(&mut self, frame: &Mat) -> Result<()> {
        highgui::imshow(&self.window, frame)?;
        Ok(())
    }

    fn poll_command(&mut self) -> Result<Command> {
        Ok(Command::from_key(highgui::wait_key(1)?))
    }

    fn close(&mut self) -> Result<()> {
        highgui::destroy_window(&self.window)?;
        Ok(())
    }
}
