//! Real devices through CPAL
//!
//! `cpal::Stream` isn't `Send` on every platform, so each stream is built on,
//! and never leaves, its own thread. The owning handle drives it over a
//! command channel and joins the thread when closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SampleRate, SizedSample, SupportedStreamConfig};
use rtrb::{Consumer, Producer};
use tracing::{debug, error, info, warn};

use crate::config::CaptureConstraints;
use crate::error::{Error, Result};
use crate::host::{AudioHost, CaptureTrack, HostCapabilities, OutputDevice, TrackSettings};

/// Host for the system's default input and output devices.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }

    /// Name of the default output device, if there is one.
    pub fn default_output_name(&self) -> Option<String> {
        let device = cpal::default_host().default_output_device()?;
        Some(device.name().unwrap_or_else(|_| "Unknown".into()))
    }

    /// Name of the default input device, if there is one.
    pub fn default_input_name(&self) -> Option<String> {
        let device = cpal::default_host().default_input_device()?;
        Some(device.name().unwrap_or_else(|_| "Unknown".into()))
    }
}

impl AudioHost for CpalHost {
    fn capabilities(&self) -> HostCapabilities {
        // processors run in-process, on the render thread
        HostCapabilities { processing_modules: true }
    }

    fn open_output(&mut self, sample_rate: u32) -> Result<Box<dyn OutputDevice>> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(Error::NoOutputDevice)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        let config = pick_output_config(&device, &name, sample_rate)?;

        info!(
            device = %name,
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            format = ?config.sample_format(),
            "opened output device"
        );

        Ok(Box::new(CpalOutput {
            device,
            name,
            config,
            thread: None,
        }))
    }

    fn open_input(
        &mut self,
        constraints: &CaptureConstraints,
        sink: Producer<f32>,
    ) -> Result<Vec<Box<dyn CaptureTrack>>> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(Error::NoInputDevice)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        let config = pick_input_config(&device, &name, constraints)?;

        if config.channels() != constraints.channel_count {
            warn!(
                device = %name,
                channels = config.channels(),
                "input can't capture {} channel(s); down-mixing",
                constraints.channel_count
            );
        }

        let settings = TrackSettings {
            channel_count: config.channels(),
            sample_rate: config.sample_rate().0,
        };
        let live = Arc::new(AtomicBool::new(true));

        let thread = {
            let live = live.clone();
            let name = name.clone();
            DeviceThread::spawn("stille-capture", move || {
                build_input_stream(&device, &name, &config, sink, live)
            })?
        };

        info!(device = %name, sample_rate = settings.sample_rate, "capture started");

        Ok(vec![Box::new(CpalTrack {
            label: name,
            settings,
            live,
            thread: Some(thread),
        })])
    }
}

fn supported_format(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}

fn pick_output_config(device: &cpal::Device, name: &str, sample_rate: u32) -> Result<SupportedStreamConfig> {
    let rate = SampleRate(sample_rate);
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| configs_error(name, e))?
        .filter(|r| supported_format(r.sample_format()))
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .collect();

    let best = ranges
        .iter()
        .find(|r| r.channels() == 2)
        .or_else(|| ranges.first());
    if let Some(range) = best {
        return Ok(range.clone().with_sample_rate(rate));
    }

    // the device can't do the rate; run at its default and let the caller notice
    let fallback = device
        .default_output_config()
        .map_err(Error::backend)?;
    if !supported_format(fallback.sample_format()) {
        return Err(Error::UnsupportedConfig {
            name: name.to_string(),
            channels: fallback.channels(),
            sample_rate,
        });
    }
    Ok(fallback)
}

fn pick_input_config(
    device: &cpal::Device,
    name: &str,
    constraints: &CaptureConstraints,
) -> Result<SupportedStreamConfig> {
    let rate = SampleRate(constraints.sample_rate);
    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| configs_error(name, e))?
        .filter(|r| supported_format(r.sample_format()))
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .collect();

    ranges
        .iter()
        .find(|r| r.channels() == constraints.channel_count)
        .or_else(|| ranges.iter().min_by_key(|r| r.channels()))
        .map(|r| r.clone().with_sample_rate(rate))
        .ok_or_else(|| Error::UnsupportedConfig {
            name: name.to_string(),
            channels: constraints.channel_count,
            sample_rate: constraints.sample_rate,
        })
}

/// Backends report missing microphone permission as a plain message.
fn backend_message(description: String) -> Error {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") {
        Error::PermissionDenied
    } else {
        Error::Backend(description)
    }
}

fn configs_error(name: &str, err: cpal::SupportedStreamConfigsError) -> Error {
    match err {
        cpal::SupportedStreamConfigsError::DeviceNotAvailable => Error::DeviceUnavailable {
            name: name.to_string(),
        },
        cpal::SupportedStreamConfigsError::BackendSpecific { err } => backend_message(err.description),
        other => Error::backend(other),
    }
}

fn build_error(name: &str, config: &cpal::StreamConfig, err: cpal::BuildStreamError) -> Error {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => Error::DeviceUnavailable {
            name: name.to_string(),
        },
        cpal::BuildStreamError::StreamConfigNotSupported => Error::UnsupportedConfig {
            name: name.to_string(),
            channels: config.channels,
            sample_rate: config.sample_rate.0,
        },
        cpal::BuildStreamError::BackendSpecific { err } => backend_message(err.description),
        other => Error::backend(other),
    }
}

fn build_output_stream(
    device: &cpal::Device,
    name: &str,
    config: &SupportedStreamConfig,
    consumer: Consumer<f32>,
) -> Result<cpal::Stream> {
    let stream_config = config.config();
    let stream = match config.sample_format() {
        SampleFormat::F32 => output_stream::<f32>(device, &stream_config, consumer),
        SampleFormat::I16 => output_stream::<i16>(device, &stream_config, consumer),
        SampleFormat::U16 => output_stream::<u16>(device, &stream_config, consumer),
        other => {
            return Err(Error::backend(format!("unsupported sample format: {:?}", other)));
        }
    }
    .map_err(|e| build_error(name, &stream_config, e))?;

    // some backends start streams as soon as they're built
    if let Err(e) = stream.pause() {
        debug!(error = %e, "could not pause new output stream");
    }
    Ok(stream)
}

fn output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
) -> core::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for sample in data.iter_mut() {
                let s = consumer.pop().unwrap_or(0.0);
                *sample = T::from_sample(s.clamp(-1.0, 1.0));
            }
        },
        |err| error!(error = %err, "output stream error"),
        None,
    )
}

fn build_input_stream(
    device: &cpal::Device,
    name: &str,
    config: &SupportedStreamConfig,
    sink: Producer<f32>,
    live: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let stream_config = config.config();
    let stream = match config.sample_format() {
        SampleFormat::F32 => input_stream::<f32>(device, &stream_config, sink, live),
        SampleFormat::I16 => input_stream::<i16>(device, &stream_config, sink, live),
        SampleFormat::U16 => input_stream::<u16>(device, &stream_config, sink, live),
        other => {
            return Err(Error::backend(format!("unsupported sample format: {:?}", other)));
        }
    }
    .map_err(|e| build_error(name, &stream_config, e))?;

    stream.play().map_err(|e| match e {
        cpal::PlayStreamError::DeviceNotAvailable => Error::DeviceUnavailable {
            name: name.to_string(),
        },
        cpal::PlayStreamError::BackendSpecific { err } => backend_message(err.description),
        #[allow(unreachable_patterns)]
        other => Error::backend(other),
    })?;
    Ok(stream)
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut sink: Producer<f32>,
    live: Arc<AtomicBool>,
) -> core::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let scale = 1.0 / channels as f32;

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for frame in data.chunks(channels) {
                let mono: f32 = frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() * scale;
                // drops samples if the graph isn't keeping up
                let _ = sink.push(mono);
            }
        },
        move |err| {
            error!(error = %err, "capture stream error");
            live.store(false, Ordering::Relaxed);
        },
        None,
    )
}

enum Command {
    Play,
    Pause,
    Stop,
}

type Request = (Command, Sender<Result<()>>);

/// A thread owning one `cpal::Stream`.
struct DeviceThread {
    commands: Sender<Request>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceThread {
    /// Spawn the thread and build the stream on it. Returns once the stream
    /// is built, or with the build error.
    fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (commands, requests) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                serve(&stream, requests);
            })
            .map_err(Error::backend)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::ThreadPanicked("device"))
            }
        }
    }

    fn request(&self, command: Command) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send((command, reply_tx))
            .map_err(|_| Error::ThreadPanicked("device"))?;
        reply_rx.recv().map_err(|_| Error::ThreadPanicked("device"))?
    }

    /// Drop the stream and join the thread.
    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // a dead thread has already dropped its stream
        let _ = self.request(Command::Stop);
        handle.join().map_err(|_| Error::ThreadPanicked("device"))
    }
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "device thread did not shut down cleanly");
        }
    }
}

fn serve(stream: &cpal::Stream, requests: Receiver<Request>) {
    for (command, reply) in requests {
        let result = match command {
            Command::Play => stream.play().map_err(Error::backend),
            Command::Pause => stream.pause().map_err(Error::backend),
            Command::Stop => {
                let _ = reply.send(Ok(()));
                break;
            }
        };
        let _ = reply.send(result);
    }
}

struct CpalOutput {
    device: cpal::Device,
    name: String,
    config: SupportedStreamConfig,
    thread: Option<DeviceThread>,
}

impl CpalOutput {
    fn thread(&self) -> Result<&DeviceThread> {
        self.thread
            .as_ref()
            .ok_or_else(|| Error::backend("output device has no source attached"))
    }
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    fn channels(&self) -> usize {
        self.config.channels() as usize
    }

    fn attach(&mut self, source: Consumer<f32>) -> Result<()> {
        if self.thread.is_some() {
            return Err(Error::backend("output device already has a source attached"));
        }
        let device = self.device.clone();
        let name = self.name.clone();
        let config = self.config.clone();
        self.thread = Some(DeviceThread::spawn("stille-output", move || {
            build_output_stream(&device, &name, &config, source)
        })?);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.thread()?.request(Command::Play)
    }

    fn pause(&mut self) -> Result<()> {
        self.thread()?.request(Command::Pause)
    }

    fn close(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(mut thread) => {
                debug!(device = %self.name, "closing output device");
                thread.shutdown()
            }
            None => Ok(()),
        }
    }
}

struct CpalTrack {
    label: String,
    settings: TrackSettings,
    live: Arc<AtomicBool>,
    thread: Option<DeviceThread>,
}

impl CaptureTrack for CpalTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn settings(&self) -> TrackSettings {
        self.settings
    }

    fn is_live(&self) -> bool {
        self.thread.is_some() && self.live.load(Ordering::Relaxed)
    }

    fn stop(&mut self) {
        self.live.store(false, Ordering::Relaxed);
        if let Some(mut thread) = self.thread.take() {
            if let Err(e) = thread.shutdown() {
                warn!(track = %self.label, error = %e, "capture thread did not shut down cleanly");
            }
        }
    }
}
