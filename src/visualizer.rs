//! Live terminal view of both channels.

use std::{
    io::{stdout, Stdout, Write},
    panic,
    time::Duration,
};

use anyhow::Result;
use crossbeam::{channel::Receiver, select};
use crossterm::{
    cursor,
    event::{self, KeyCode, KeyEventKind},
    execute, queue,
    style::{self, Color},
    terminal,
};

use binaural_beats::{
    misc::{buf_writer::FrameWriter, ring_buffer::RingBuffer},
    session::{FocusChange, Player, PlayerStatus, SessionEvent},
    EngineEvent, WaveformSnapshot,
};

use crate::format_duration;

const DOT: &str = "•";
const LEVELS: &[char] = &[' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const HISTORY: usize = 48;
const VOLUME_STEP: f32 = 0.05;
const CHANNEL_COLORS: [Color; 2] = [Color::Cyan, Color::Magenta];
/// How long to wait for a snapshot before polling the keyboard anyway.
const IDLE_REDRAW: Duration = Duration::from_millis(100);

struct Visualizer<'a> {
    player: &'a Player,
    label: &'a str,
    snapshots: Receiver<WaveformSnapshot>,
    session_events: Receiver<SessionEvent>,
    engine_events: Receiver<EngineEvent>,
    stdout: FrameWriter<Stdout>,

    rms_history: RingBuffer<f32, HISTORY>,
    last: Option<WaveformSnapshot>,
    remaining: Option<Duration>,
    message: Option<String>,
}

enum Flow {
    Continue,
    Quit,
}

/// Draws until the session ends or the user quits.
pub fn run(player: &Player, label: &str) -> Result<()> {
    init()?;
    let mut visualizer = Visualizer {
        player,
        label,
        snapshots: player.engine().subscribe_snapshots(4),
        session_events: player.subscribe(64),
        engine_events: player.engine().subscribe_events(16),
        stdout: FrameWriter::with_capacity(stdout(), 16 * 1024),
        rms_history: RingBuffer::new(),
        last: None,
        remaining: player.remaining(),
        message: None,
    };

    let result = visualizer.run();
    exit()?;
    player.stop();

    if let Some(message) = visualizer.message {
        println!("{message}");
    }
    result
}

impl Visualizer<'_> {
    fn run(&mut self) -> Result<()> {
        let (snapshots, session_events, engine_events) = (
            self.snapshots.clone(),
            self.session_events.clone(),
            self.engine_events.clone(),
        );

        loop {
            select! {
                recv(snapshots) -> snapshot => {
                    if let Ok(snapshot) = snapshot {
                        self.rms_history.push(snapshot.rms());
                        self.last = Some(snapshot);
                    }
                },
                recv(session_events) -> event => {
                    if let Ok(event) = event {
                        if let Flow::Quit = self.on_session_event(event) {
                            return Ok(());
                        }
                    }
                },
                recv(engine_events) -> event => {
                    if let Ok(EngineEvent::PlaybackFailed { reason, .. }) = event {
                        self.message = Some(format!("[-] Playback failed: {reason}"));
                        return Ok(());
                    }
                },
                default(IDLE_REDRAW) => {}
            }

            self.draw()?;
            if let Flow::Quit = self.handle_events()? {
                return Ok(());
            }
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::TimerTick(left) => self.remaining = Some(left),
            SessionEvent::Finished => {
                self.message = Some("[*] Done".to_owned());
                return Flow::Quit;
            }
            SessionEvent::Stopped => return Flow::Quit,
            SessionEvent::PlaybackFailed(reason) => {
                self.message = Some(format!("[-] Playback failed: {reason}"));
                return Flow::Quit;
            }
            SessionEvent::Interrupted => self.last = None,
            _ => {}
        }

        Flow::Continue
    }

    fn draw(&mut self) -> Result<()> {
        let (width, height) = terminal::size()?;
        let (width, height) = (width as usize, height as usize);
        if width < 16 || height < 8 {
            return Ok(());
        }

        let (top_line, history_line) = (self.top_line(width), self.history_line(width));
        queue!(
            self.stdout,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0),
            style::Print(top_line),
            cursor::MoveTo(0, 1),
            style::Print(history_line),
        )?;

        // Each channel gets half of the rows between the header and the help line
        let lane = (height - 3) / 2;
        if let Some(snapshot) = &self.last {
            for (channel, color) in CHANNEL_COLORS.into_iter().enumerate() {
                let top = 2 + channel * lane;
                let samples = snapshot.channel(channel).collect::<Vec<_>>();
                queue!(self.stdout, style::SetForegroundColor(color))?;

                for x in 0..width {
                    let Some(&sample) = samples.get(x * samples.len() / width) else {
                        break;
                    };

                    // Full scale positive at the top of the lane, negative at the bottom
                    let level = (1.0 - sample as f32 / i16::MAX as f32) / 2.0;
                    let y = top + ((level * (lane - 1) as f32).round() as usize).min(lane - 1);
                    queue!(
                        self.stdout,
                        cursor::MoveTo(x as u16, y as u16),
                        style::Print(DOT)
                    )?;
                }
            }
            queue!(self.stdout, style::ResetColor)?;
        }

        queue!(
            self.stdout,
            cursor::MoveTo(0, height as u16 - 1),
            style::Print("[↑/↓] Volume  [Space] Interrupt / Resume  [Esc/Q] Quit"),
        )?;
        self.stdout.flush()?;
        Ok(())
    }

    fn top_line(&self, width: usize) -> String {
        let status = match self.player.status() {
            PlayerStatus::Idle => "Idle",
            PlayerStatus::Playing => "Playing",
            PlayerStatus::FadingOut => "Fading out",
            PlayerStatus::Interrupted => "Interrupted",
        };
        let timer = match self.remaining {
            Some(left) => format_duration(left),
            None => "∞".to_owned(),
        };
        let rms = self.last.as_ref().map_or(0.0, |x| x.rms());

        let line = format!(
            "{} │ {status} │ Vol {:.0}% │ {timer} │ RMS {rms:.3} (avg {:.3})",
            self.label,
            self.player.frequency_volume() * 100.0,
            self.rms_history.avg()
        );
        line.chars().take(width).collect()
    }

    /// Sparkline of recent block loudness, newest on the right.
    fn history_line(&self, width: usize) -> String {
        let max = self.rms_history.max().max(f32::EPSILON);
        let line = self
            .rms_history
            .iter()
            .map(|x| LEVELS[((x / max) * (LEVELS.len() - 1) as f32).round() as usize])
            .collect::<String>();
        format!("RMS {line}").chars().take(width).collect()
    }

    fn handle_events(&mut self) -> Result<Flow> {
        if !event::poll(Duration::ZERO)? {
            return Ok(Flow::Continue);
        }

        match event::read()? {
            event::Event::Key(e) if e.kind != KeyEventKind::Release => match e.code {
                KeyCode::Esc | KeyCode::Char('q') => return Ok(Flow::Quit),
                KeyCode::Up => {
                    self.player
                        .set_frequency_volume(self.player.frequency_volume() + VOLUME_STEP);
                }
                KeyCode::Down => {
                    self.player
                        .set_frequency_volume(self.player.frequency_volume() - VOLUME_STEP);
                }
                KeyCode::Char(' ') => {
                    let change = if self.player.status() == PlayerStatus::Interrupted {
                        FocusChange::Gain
                    } else {
                        FocusChange::LossTransient
                    };
                    self.player.handle_focus(change)?;
                }
                _ => {}
            },
            event::Event::Resize(..) => {
                execute!(stdout(), terminal::Clear(terminal::ClearType::All))?
            }
            _ => {}
        }

        Ok(Flow::Continue)
    }
}

fn init() -> Result<()> {
    // The terminal is unusable after a panic in raw mode, so put it back first
    let hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let _ = exit();
        hook(info);
    }));

    terminal::enable_raw_mode()?;
    execute!(
        stdout(),
        terminal::EnterAlternateScreen,
        terminal::DisableLineWrap,
        cursor::Hide
    )?;
    Ok(())
}

/// Cleans up the terminal and disables raw mode.
fn exit() -> Result<()> {
    execute!(
        stdout(),
        terminal::LeaveAlternateScreen,
        terminal::EnableLineWrap,
        cursor::Show
    )?;
    terminal::disable_raw_mode()?;
    Ok(())
}
