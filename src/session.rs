//! Playback session around the engine: sleep timer, fade-out, ambient volume
//! and interruptions from other audio.

use std::{sync::Arc, time::Duration};

use crossbeam::channel::Receiver;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::{
    bus::Bus,
    config::{EngineConfig, FadeConfig},
    engine::{RunHandle, SignalEngine},
    error::EngineError,
    fade::FadeOut,
    timer::Countdown,
    volume::{clamp_volume, VolumeControl},
};

/// How often the sleep timer reports the remaining time.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Changes in access to the audio output, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    /// Someone else needs the output for a while (a call, a notification).
    LossTransient,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Playing,
    FadingOut,
    /// Paused by a transient focus loss, waiting for focus to come back.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Time left on the sleep timer. Zero once it ran out or the session stopped.
    TimerTick(Duration),
    FadeStarted,
    /// The fade-out completed and the engine was stopped.
    Finished,
    Stopped,
    Interrupted,
    Resumed,
    PlaybackFailed(String),
}

pub struct Player {
    shared: Arc<Shared>,
}

struct Shared {
    engine: Arc<SignalEngine>,
    ambient: Option<Arc<dyn VolumeControl>>,
    fade_config: FadeConfig,
    tick: Duration,
    inner: Mutex<Inner>,
    events: Bus<SessionEvent>,
}

struct Inner {
    status: PlayerStatus,
    config: Option<EngineConfig>,
    remaining: Option<Duration>,
    countdown: Option<Countdown>,
    fade: Option<FadeOut>,
    frequency_volume: f32,
    ambient_volume: f32,
    /// Bumped whenever the session is restarted or torn down.
    /// Timer callbacks from an older generation do nothing.
    generation: u64,
}

impl Player {
    pub fn new(engine: Arc<SignalEngine>, ambient: Option<Arc<dyn VolumeControl>>) -> Self {
        Self::with_timing(engine, ambient, FadeConfig::default(), TICK_INTERVAL)
    }

    pub fn with_timing(
        engine: Arc<SignalEngine>,
        ambient: Option<Arc<dyn VolumeControl>>,
        fade_config: FadeConfig,
        tick: Duration,
    ) -> Self {
        let ambient_volume = ambient.as_ref().map_or(1.0, |x| x.volume());
        Self {
            shared: Arc::new(Shared {
                engine,
                ambient,
                fade_config,
                tick,
                inner: Mutex::new(Inner {
                    status: PlayerStatus::Idle,
                    config: None,
                    remaining: None,
                    countdown: None,
                    fade: None,
                    frequency_volume: 1.0,
                    ambient_volume,
                    generation: 0,
                }),
                events: Bus::new(),
            }),
        }
    }

    /// Starts playing `config`, replacing whatever was playing before.
    /// With a `duration` the session fades out and stops once it elapses.
    pub fn play(
        &self,
        config: EngineConfig,
        duration: Option<Duration>,
    ) -> Result<RunHandle, EngineError> {
        let shared = &self.shared;
        shared.teardown();

        let mut inner = shared.inner.lock();
        shared.engine.stop();
        if let Some(ambient) = &shared.ambient {
            // A fade that was cancelled may have left it lowered
            ambient.set_volume(inner.ambient_volume);
        }

        let run = match shared.engine.start(config, inner.frequency_volume) {
            Ok(run) => run,
            Err(err) => {
                inner.status = PlayerStatus::Idle;
                drop(inner);
                shared
                    .events
                    .publish(&SessionEvent::PlaybackFailed(err.to_string()));
                return Err(err);
            }
        };

        inner.generation += 1;
        inner.status = PlayerStatus::Playing;
        inner.config = Some(config);
        inner.remaining = duration;
        if let Some(duration) = duration {
            let countdown = Shared::start_countdown(shared, inner.generation, duration);
            // Replacing an older handle only signals it, which never blocks
            inner.countdown = countdown;
        }

        info!(
            "Playing {} Hz / {} Hz{}",
            config.carrier_hz,
            config.right_hz(),
            duration.map_or(String::new(), |x| format!(" for {}s", x.as_secs()))
        );
        Ok(run)
    }

    /// Ends the session right away, without fading.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Reacts to the output being taken away or handed back.
    /// A transient loss pauses the session and keeps the remaining timer,
    /// gaining focus resumes it, a permanent loss stops it.
    pub fn handle_focus(&self, change: FocusChange) -> Result<(), EngineError> {
        match change {
            FocusChange::LossTransient => self.pause(),
            FocusChange::Gain => self.resume()?,
            FocusChange::Loss => self.stop(),
        }

        Ok(())
    }

    /// Sets the tone volume, remembered across runs. Returns the clamped value.
    pub fn set_frequency_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.shared.inner.lock().frequency_volume = volume;
        self.shared.engine.set_volume(volume);
        volume
    }

    pub fn set_ambient_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.shared.inner.lock().ambient_volume = volume;
        if let Some(ambient) = &self.shared.ambient {
            ambient.set_volume(volume);
        }
        volume
    }

    pub fn frequency_volume(&self) -> f32 {
        self.shared.inner.lock().frequency_volume
    }

    pub fn ambient_volume(&self) -> f32 {
        self.shared.inner.lock().ambient_volume
    }

    /// A session whose engine died on its own is ended here and reports `Idle`.
    pub fn status(&self) -> PlayerStatus {
        self.shared.reap_dead_run();
        self.shared.inner.lock().status
    }

    /// Time left on the sleep timer, as of the last tick.
    pub fn remaining(&self) -> Option<Duration> {
        self.shared.inner.lock().remaining
    }

    /// Config of the current or most recent session.
    pub fn config(&self) -> Option<EngineConfig> {
        self.shared.inner.lock().config
    }

    pub fn engine(&self) -> &Arc<SignalEngine> {
        &self.shared.engine
    }

    pub fn subscribe(&self, capacity: usize) -> Receiver<SessionEvent> {
        self.shared.events.subscribe(capacity)
    }

    fn pause(&self) {
        let shared = &self.shared;
        if shared.reap_dead_run() {
            return;
        }

        let mut inner = shared.inner.lock();
        match inner.status {
            PlayerStatus::Playing => {}
            // Too late to pause, the session was about to end anyway
            PlayerStatus::FadingOut => {
                drop(inner);
                shared.stop();
                return;
            }
            PlayerStatus::Idle | PlayerStatus::Interrupted => return,
        }

        inner.generation += 1;
        inner.status = PlayerStatus::Interrupted;
        let countdown = inner.countdown.take();
        let remaining = inner.remaining;
        drop(inner);

        if let Some(countdown) = countdown {
            countdown.cancel();
        }
        shared.engine.stop();

        debug!("paused with {remaining:?} left on the timer");
        shared.events.publish(&SessionEvent::Interrupted);
    }

    fn resume(&self) -> Result<(), EngineError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if inner.status != PlayerStatus::Interrupted {
            return Ok(());
        }

        let Some(config) = inner.config else {
            inner.status = PlayerStatus::Idle;
            return Ok(());
        };

        if let Err(err) = shared.engine.start(config, inner.frequency_volume) {
            error!("Failed to resume: {err}");
            inner.status = PlayerStatus::Idle;
            inner.remaining = None;
            drop(inner);
            shared
                .events
                .publish(&SessionEvent::PlaybackFailed(err.to_string()));
            return Err(err);
        }

        inner.generation += 1;
        inner.status = PlayerStatus::Playing;
        if let Some(remaining) = inner.remaining {
            inner.countdown = Shared::start_countdown(shared, inner.generation, remaining);
        }
        drop(inner);

        shared.events.publish(&SessionEvent::Resumed);
        Ok(())
    }
}

impl Shared {
    /// Invalidates the current generation and cancels its timers.
    /// Timers are cancelled without holding the lock, their callbacks take it too.
    fn teardown(&self) {
        let (countdown, fade) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.status = PlayerStatus::Idle;
            (inner.countdown.take(), inner.fade.take())
        };

        if let Some(countdown) = countdown {
            countdown.cancel();
        }
        if let Some(fade) = fade {
            fade.cancel();
        }
    }

    /// Ends a playing session whose engine stopped without being asked to,
    /// so it cannot be paused and resumed later. Returns whether it did.
    fn reap_dead_run(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            let live = matches!(inner.status, PlayerStatus::Playing | PlayerStatus::FadingOut);
            if !live || self.engine.is_running() {
                return false;
            }

            inner.generation += 1;
            inner.status = PlayerStatus::Idle;
            inner.remaining = None;
            // Only signals the timer threads, one of them may be the caller
            inner.countdown = None;
            inner.fade = None;
        }

        warn!("Audio output stopped unexpectedly, ending the session");
        self.events.publish(&SessionEvent::PlaybackFailed(
            "audio output stopped unexpectedly".to_owned(),
        ));
        true
    }

    fn stop(&self) {
        self.teardown();
        self.inner.lock().remaining = None;
        self.engine.stop();

        self.events.publish(&SessionEvent::TimerTick(Duration::ZERO));
        self.events.publish(&SessionEvent::Stopped);
    }

    fn start_countdown(this: &Arc<Self>, generation: u64, duration: Duration) -> Option<Countdown> {
        let ticking = Arc::downgrade(this);
        let finishing = Arc::downgrade(this);

        let countdown = Countdown::start(
            duration,
            this.tick,
            move |remaining| {
                if let Some(shared) = ticking.upgrade() {
                    shared.tick(generation, remaining);
                }
            },
            move || {
                if let Some(shared) = finishing.upgrade() {
                    Shared::begin_fade(&shared, generation);
                }
            },
        );

        match countdown {
            Ok(countdown) => Some(countdown),
            Err(err) => {
                error!("Failed to start the sleep timer: {err}");
                None
            }
        }
    }

    fn tick(&self, generation: u64, remaining: Duration) {
        if self.reap_dead_run() {
            return;
        }

        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.remaining = Some(remaining);
        }

        self.events.publish(&SessionEvent::TimerTick(remaining));
    }

    fn begin_fade(this: &Arc<Self>, generation: u64) {
        let mut inner = this.inner.lock();
        if inner.generation != generation || inner.status != PlayerStatus::Playing {
            return;
        }

        inner.remaining = Some(Duration::ZERO);
        inner.countdown = None;
        if !this.engine.is_running() {
            inner.status = PlayerStatus::Idle;
            return;
        }

        let mut channels = vec![this.engine.clone() as Arc<dyn VolumeControl>];
        channels.extend(this.ambient.clone());

        let finishing = Arc::downgrade(this);
        let fade = FadeOut::start(this.fade_config, channels, move || {
            if let Some(shared) = finishing.upgrade() {
                shared.finish(generation);
            }
        });

        match fade {
            Ok(fade) => {
                inner.status = PlayerStatus::FadingOut;
                inner.fade = Some(fade);
                drop(inner);

                info!("Timer done, fading out");
                this.events.publish(&SessionEvent::TimerTick(Duration::ZERO));
                this.events.publish(&SessionEvent::FadeStarted);
            }
            Err(err) => {
                error!("Failed to start the fade out: {err}");
                drop(inner);
                this.finish(generation);
            }
        }
    }

    /// Runs on the fade thread once the ramp reached zero.
    fn finish(&self, generation: u64) {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.generation += 1;
            inner.status = PlayerStatus::Idle;
            inner.remaining = None;
            // Dropping our own handle only signals the thread we are running on
            inner.fade = None;
        }

        self.engine.stop();
        info!("Session finished");
        self.events.publish(&SessionEvent::Finished);
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.shared.inner.lock().status != PlayerStatus::Idle {
            self.shared.stop();
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use crossbeam::channel::Receiver;

    use super::{FocusChange, Player, PlayerStatus, SessionEvent};
    use crate::{
        audio::sink::MemorySinkFactory,
        config::{EngineConfig, FadeConfig},
        engine::SignalEngine,
        error::EngineError,
        volume::{AtomicVolume, VolumeControl},
    };

    const ALPHA: EngineConfig = EngineConfig {
        carrier_hz: 150.0,
        beat_hz: 10.0,
        sample_rate: 44100,
    };

    fn player(factory: &MemorySinkFactory, ambient: &Arc<AtomicVolume>) -> Player {
        Player::with_timing(
            Arc::new(SignalEngine::new(factory.clone())),
            Some(ambient.clone() as Arc<dyn VolumeControl>),
            FadeConfig::new(Duration::from_millis(150), Duration::from_millis(10)),
            Duration::from_millis(20),
        )
    }

    /// Collects events until one matches `until`, failing after a few seconds.
    fn wait_for(
        events: &Receiver<SessionEvent>,
        until: impl Fn(&SessionEvent) -> bool,
    ) -> Vec<SessionEvent> {
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut seen = Vec::new();
        loop {
            let event = events
                .recv_deadline(deadline)
                .unwrap_or_else(|_| panic!("timed out, saw {seen:?}"));
            let done = until(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    #[test]
    fn test_play_then_stop() {
        let factory = MemorySinkFactory::new(64).realtime();
        let player = player(&factory, &Arc::new(AtomicVolume::new(0.5)));
        let events = player.subscribe(64);

        player.play(ALPHA, None).unwrap();
        assert_eq!(player.status(), PlayerStatus::Playing);
        assert_eq!(player.remaining(), None);

        player.stop();
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(factory.open_sinks(), 0);
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            [SessionEvent::TimerTick(Duration::ZERO), SessionEvent::Stopped]
        );
    }

    #[test]
    fn test_timer_fades_out_and_finishes() {
        let factory = MemorySinkFactory::new(64).realtime();
        let ambient = Arc::new(AtomicVolume::new(0.5));
        let player = player(&factory, &ambient);
        let events = player.subscribe(256);

        player.play(ALPHA, Some(Duration::from_millis(100))).unwrap();
        let seen = wait_for(&events, |x| *x == SessionEvent::FadeStarted);
        assert!(matches!(seen[0], SessionEvent::TimerTick(x) if x > Duration::from_millis(50)));
        assert_eq!(player.status(), PlayerStatus::FadingOut);

        wait_for(&events, |x| *x == SessionEvent::Finished);
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(ambient.volume(), 0.0);
        assert_eq!(factory.open_sinks(), 0);
        assert!(!player.engine().is_running());
    }

    #[test]
    fn test_play_cancels_fade() {
        let factory = MemorySinkFactory::new(64).realtime();
        let ambient = Arc::new(AtomicVolume::new(0.5));
        let player = player(&factory, &ambient);
        let events = player.subscribe(256);

        player.set_frequency_volume(0.8);
        player.play(ALPHA, Some(Duration::from_millis(40))).unwrap();
        wait_for(&events, |x| *x == SessionEvent::FadeStarted);
        thread::sleep(Duration::from_millis(50));

        let config = EngineConfig::new(528.0, 0.0);
        player.play(config, None).unwrap();
        assert_eq!(player.engine().volume(), Some(0.8));
        assert_eq!(ambient.volume(), 0.5);

        thread::sleep(Duration::from_millis(300));
        assert_eq!(player.status(), PlayerStatus::Playing);
        assert_eq!(player.engine().volume(), Some(0.8));
        assert_eq!(player.config(), Some(config));
        assert!(!events.try_iter().any(|x| x == SessionEvent::Finished));
        player.stop();
    }

    /// Long fade so the session is still fading when the test acts on it.
    fn fading_player(factory: &MemorySinkFactory, ambient: &Arc<AtomicVolume>) -> Player {
        let player = Player::with_timing(
            Arc::new(SignalEngine::new(factory.clone())),
            Some(ambient.clone() as Arc<dyn VolumeControl>),
            FadeConfig::new(Duration::from_secs(1), Duration::from_millis(10)),
            Duration::from_millis(20),
        );
        player.play(ALPHA, Some(Duration::from_millis(40))).unwrap();
        player
    }

    #[test]
    fn test_stop_while_fading() {
        let factory = MemorySinkFactory::new(64).realtime();
        let ambient = Arc::new(AtomicVolume::new(0.5));
        let player = fading_player(&factory, &ambient);
        let events = player.subscribe(256);

        wait_for(&events, |x| *x == SessionEvent::FadeStarted);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(player.status(), PlayerStatus::FadingOut);

        player.stop();
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(factory.open_sinks(), 0);
        assert_eq!(player.remaining(), None);

        // The ramp stopped with the session
        let level = ambient.volume();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(ambient.volume(), level);

        let seen = events.try_iter().collect::<Vec<_>>();
        assert!(seen.contains(&SessionEvent::Stopped));
        assert!(!seen.contains(&SessionEvent::Finished));
    }

    #[test]
    fn test_transient_loss_while_fading_stops() {
        let factory = MemorySinkFactory::new(64).realtime();
        let ambient = Arc::new(AtomicVolume::new(0.5));
        let player = fading_player(&factory, &ambient);
        let events = player.subscribe(256);

        wait_for(&events, |x| *x == SessionEvent::FadeStarted);
        player.handle_focus(FocusChange::LossTransient).unwrap();
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(factory.open_sinks(), 0);

        // Nothing was paused, so focus coming back plays nothing
        player.handle_focus(FocusChange::Gain).unwrap();
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(factory.opened(), 1);

        thread::sleep(Duration::from_millis(200));
        let seen = events.try_iter().collect::<Vec<_>>();
        assert!(seen.contains(&SessionEvent::Stopped));
        assert!(!seen.contains(&SessionEvent::Interrupted));
        assert!(!seen.contains(&SessionEvent::Finished));
    }

    #[test]
    fn test_transient_loss_pauses_and_resumes() {
        let factory = MemorySinkFactory::new(64).realtime();
        let player = player(&factory, &Arc::new(AtomicVolume::new(0.5)));
        let events = player.subscribe(256);

        player.play(ALPHA, Some(Duration::from_secs(5))).unwrap();
        thread::sleep(Duration::from_millis(100));

        player.handle_focus(FocusChange::LossTransient).unwrap();
        assert_eq!(player.status(), PlayerStatus::Interrupted);
        assert_eq!(factory.open_sinks(), 0);
        let paused_at = player.remaining().unwrap();
        assert!(paused_at < Duration::from_secs(5) && paused_at > Duration::from_secs(4));

        // The timer does not run while interrupted
        thread::sleep(Duration::from_millis(100));
        assert_eq!(player.remaining(), Some(paused_at));

        player.handle_focus(FocusChange::Gain).unwrap();
        assert_eq!(player.status(), PlayerStatus::Playing);
        assert_eq!(player.config(), Some(ALPHA));
        assert_eq!(factory.opened(), 2);
        assert!(player.remaining().unwrap() <= paused_at);

        let seen = wait_for(&events, |x| *x == SessionEvent::Resumed);
        assert!(seen.contains(&SessionEvent::Interrupted));
        player.stop();
    }

    #[test]
    fn test_permanent_loss_stops() {
        let factory = MemorySinkFactory::new(64).realtime();
        let player = player(&factory, &Arc::new(AtomicVolume::new(0.5)));

        player.play(ALPHA, Some(Duration::from_secs(5))).unwrap();
        player.handle_focus(FocusChange::Loss).unwrap();
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(player.remaining(), None);

        // Nothing to resume after a permanent loss
        player.handle_focus(FocusChange::Gain).unwrap();
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(factory.open_sinks(), 0);
    }

    #[test]
    fn test_volumes_are_remembered() {
        let factory = MemorySinkFactory::new(64).realtime();
        let ambient = Arc::new(AtomicVolume::new(0.5));
        let player = player(&factory, &ambient);

        assert_eq!(player.set_frequency_volume(1.5), 1.0);
        assert_eq!(player.set_frequency_volume(0.3), 0.3);
        assert_eq!(player.set_ambient_volume(-1.0), 0.0);
        assert_eq!(ambient.volume(), 0.0);

        player.play(ALPHA, None).unwrap();
        assert_eq!(player.engine().volume(), Some(0.3));
        player.set_frequency_volume(0.6);
        assert_eq!(player.engine().volume(), Some(0.6));
        player.stop();
    }

    #[test]
    fn test_failed_start() {
        let factory = MemorySinkFactory::new(64).unavailable();
        let player = player(&factory, &Arc::new(AtomicVolume::new(0.5)));
        let events = player.subscribe(4);

        let result = player.play(ALPHA, Some(Duration::from_secs(1)));
        assert!(matches!(result, Err(EngineError::DeviceUnavailable(_))));
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert!(matches!(
            events.try_recv(),
            Ok(SessionEvent::PlaybackFailed(_))
        ));
    }

    #[test]
    fn test_engine_failure_ends_session() {
        let factory = MemorySinkFactory::new(64).failing_after(3);
        let player = player(&factory, &Arc::new(AtomicVolume::new(0.5)));

        player.play(ALPHA, None).unwrap();
        for _ in 0..500 {
            if player.status() == PlayerStatus::Idle {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(player.status(), PlayerStatus::Idle);
    }

    #[test]
    fn test_dead_engine_cannot_be_resumed() {
        let factory = MemorySinkFactory::new(64).failing_after(3);
        let player = player(&factory, &Arc::new(AtomicVolume::new(0.5)));
        let events = player.subscribe(256);

        player.play(ALPHA, Some(Duration::from_secs(5))).unwrap();
        let seen = wait_for(&events, |x| matches!(x, SessionEvent::PlaybackFailed(_)));
        assert_eq!(
            seen.iter()
                .filter(|x| matches!(x, SessionEvent::PlaybackFailed(_)))
                .count(),
            1
        );
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(player.remaining(), None);

        player.handle_focus(FocusChange::LossTransient).unwrap();
        assert_eq!(player.status(), PlayerStatus::Idle);
        player.handle_focus(FocusChange::Gain).unwrap();
        assert_eq!(player.status(), PlayerStatus::Idle);
        assert_eq!(factory.opened(), 1);

        // Reaped once, later checks stay quiet
        thread::sleep(Duration::from_millis(100));
        assert!(!events
            .try_iter()
            .any(|x| matches!(x, SessionEvent::PlaybackFailed(_))));
    }
}
