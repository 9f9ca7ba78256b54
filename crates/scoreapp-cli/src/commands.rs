//! Command handlers for the ScoreApp CLI

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use scoreapp_core::{
    ApiError, ConnectionState, ConnectionStateName, CrossingId, FullRace, RaceDataTracker, RaceId,
    RaceStatsCache, SnapshotSource, Subscription, TrackedRace,
};
use scoreapp_live::LiveClient;

use crate::api::{ApiResult, CrossingUpdate, RaceApi};
use crate::cli::{Cli, Commands, RaceAction, TeamArg};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::render::{self, now_millis};

/// How long one-shot commands wait for the live feed
const LIVE_WAIT: Duration = Duration::from_secs(10);

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let api = RaceApi::new(&config.api)?;
        let cache = Arc::new(RaceStatsCache::new(config.timing.lap_stats));

        match cli.command {
            Commands::Watch { race_id } => {
                Self::handle_watch_command(&config, api, cache, race_id).await
            }
            Commands::Follow => Self::handle_follow_command(&config, api, cache).await,
            Commands::Barriers { watch } => Self::handle_barriers_command(&config, watch).await,
            Commands::Stats { race_id, json } => {
                Self::handle_stats_command(&api, &cache, race_id, json).await
            }
            Commands::Status => Self::handle_status_command(&config, &api).await,
            Commands::Race { action, race_id } => {
                Self::handle_race_command(&api, &cache, action, race_id).await
            }
            Commands::Crossing {
                crossing_id,
                ignored,
                team,
                interrupted,
            } => Self::handle_crossing_command(&api, crossing_id, ignored, team, interrupted).await,
        }
    }

    /// Handle the watch command: one race, live
    async fn handle_watch_command(
        config: &AppConfig,
        api: RaceApi,
        cache: Arc<RaceStatsCache>,
        race_id: RaceId,
    ) -> Result<()> {
        let client = start_live(config)?;
        info!("Watching race {}... Press Ctrl+C to stop", race_id);

        let mut view = RaceView::open(&client, &api, cache, race_id);
        let mut states = client.watch_state();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let outcome = loop {
            let tick = tokio::select! {
                _ = &mut ctrl_c => break Ok(()),
                changed = view.next() => Tick::View(changed),
                Ok(()) = states.changed() => Tick::State(states.borrow_and_update().clone()),
            };

            match tick {
                Tick::View(Ok(true)) => view.print(),
                Tick::View(Ok(false)) => {}
                Tick::View(Err(err)) => break Err(err),
                Tick::State(state) => println!("{}", render::render_state(&state)),
                Tick::Current(_) => {}
            }
        };

        client.shutdown().await;
        outcome
    }

    /// Handle the follow command: whichever race is current, like a presentation screen
    async fn handle_follow_command(
        config: &AppConfig,
        api: RaceApi,
        cache: Arc<RaceStatsCache>,
    ) -> Result<()> {
        let client = start_live(config)?;
        info!("Following the current race... Press Ctrl+C to stop");

        let (current_tx, mut current_rx) = mpsc::unbounded_channel();
        let _current = client.on_current_race(move |current| {
            let _ = current_tx.send(*current);
        });

        let mut view: Option<RaceView> = None;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let outcome = loop {
            let tick = tokio::select! {
                _ = &mut ctrl_c => break Ok(()),
                Some(current) = current_rx.recv() => Tick::Current(current),
                changed = next_change(&mut view) => Tick::View(changed),
            };

            match tick {
                Tick::Current(Some(race_id)) => {
                    if view.as_ref().map(RaceView::race_id) != Some(race_id) {
                        println!("Now showing race {}", race_id);
                        view = Some(RaceView::open(&client, &api, Arc::clone(&cache), race_id));
                    }
                }
                Tick::Current(None) => {
                    if view.take().is_some() {
                        println!("No race is current");
                    }
                }
                Tick::View(Ok(true)) => {
                    if let Some(view) = &view {
                        view.print();
                    }
                }
                Tick::View(Ok(false)) => {}
                Tick::View(Err(err)) => break Err(err),
                Tick::State(_) => {}
            }
        };

        client.shutdown().await;
        outcome
    }

    /// Handle the barriers command
    async fn handle_barriers_command(config: &AppConfig, watch: bool) -> Result<()> {
        let client = start_live(config)?;
        let (barriers_tx, mut barriers_rx) = mpsc::unbounded_channel();
        let _barriers = client.on_barriers(move |barriers| {
            let _ = barriers_tx.send(barriers.clone());
        });

        if !watch {
            match timeout(LIVE_WAIT, barriers_rx.recv()).await {
                Ok(Some(barriers)) => println!("{}", render::render_barriers(&barriers)),
                _ => {
                    warn!("No barrier list received within {:?}", LIVE_WAIT);
                    println!("{}", render::render_barriers(&client.online_barriers()));
                }
            }
            client.shutdown().await;
            return Ok(());
        }

        info!("Watching barriers... Press Ctrl+C to stop");
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                Some(barriers) = barriers_rx.recv() => {
                    println!("{}", render::render_barriers(&barriers));
                }
            }
        }

        client.shutdown().await;
        Ok(())
    }

    /// Handle the stats command: a single snapshot, no live feed
    async fn handle_stats_command(
        api: &RaceApi,
        cache: &Arc<RaceStatsCache>,
        race_id: RaceId,
        json: bool,
    ) -> Result<()> {
        let race = api
            .find_race(race_id)
            .await?
            .ok_or(CliError::RaceNotFound(race_id))?;
        let computation = cache.get_or_compute(&race);
        computation.stats.ensure_type(&race)?;

        if json {
            println!("{}", serde_json::to_string_pretty(computation.as_ref())?);
        } else {
            print!("{}", render::render_race(&race, &computation, now_millis()));
        }
        Ok(())
    }

    /// Handle the status command
    async fn handle_status_command(config: &AppConfig, api: &RaceApi) -> Result<()> {
        let client = start_live(config)?;
        let _printer = client.on_state_change(|state| {
            println!("{}", render::render_state(state));
        });

        let settled = timeout(
            LIVE_WAIT,
            client.wait_for_state(|state| {
                matches!(
                    state.name(),
                    ConnectionStateName::Connected
                        | ConnectionStateName::MaxRetriesReached
                        | ConnectionStateName::NoUrl
                )
            }),
        )
        .await;
        if settled.is_err() {
            println!(
                "{} (still settling after {:?})",
                render::render_state(&client.state()),
                LIVE_WAIT
            );
        }

        match api.list_races().await {
            Ok(races) => println!("API {}: {} races", api.base_url(), races.len()),
            Err(err) => println!("API {}: {}", api.base_url(), err),
        }

        client.shutdown().await;
        Ok(())
    }

    /// Handle the race control command
    async fn handle_race_command(
        api: &RaceApi,
        cache: &Arc<RaceStatsCache>,
        action: RaceAction,
        race_id: RaceId,
    ) -> Result<()> {
        info!("Requesting {} of race {}", action.as_path(), race_id);
        let race = api.set_race_state(race_id, action).await?;
        let computation = cache.get_or_compute(&race);
        computation.stats.ensure_type(&race)?;
        print!("{}", render::render_race(&race, &computation, now_millis()));
        Ok(())
    }

    /// Handle the crossing update command
    async fn handle_crossing_command(
        api: &RaceApi,
        crossing_id: CrossingId,
        ignored: bool,
        team: TeamArg,
        interrupted: bool,
    ) -> Result<()> {
        let update = CrossingUpdate {
            ignored,
            team: team.into(),
            interrupted,
        };
        let crossing = api.update_crossing(crossing_id, update).await?;
        println!(
            "Crossing {} at barrier {}: team {}, ignored {}, interrupted {}",
            crossing.id,
            crossing.barrier_id,
            u8::from(crossing.team),
            crossing.ignored,
            crossing.interrupted
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Live Race View
// ----------------------------------------------------------------------------

enum Tick {
    View(Result<bool>),
    State(ConnectionState),
    Current(Option<RaceId>),
}

/// Start the live client, connecting even when auto-connect is disabled
fn start_live(config: &AppConfig) -> Result<LiveClient> {
    let client = LiveClient::spawn(&config.live)?;
    if config.live.url.is_none() {
        warn!("No live feed URL configured, showing snapshots only");
    } else if !config.live.auto_connect {
        debug!("Auto-connect disabled, connecting on demand");
        client.reconnect()?;
    }
    Ok(client)
}

/// One race shown from its snapshot and every pushed revision
struct RaceView {
    tracker: RaceDataTracker,
    pushes: mpsc::UnboundedReceiver<Arc<FullRace>>,
    fetch: Option<JoinHandle<ApiResult<Option<FullRace>>>>,
    _subscription: Subscription,
}

impl RaceView {
    fn open(client: &LiveClient, api: &RaceApi, cache: Arc<RaceStatsCache>, race_id: RaceId) -> Self {
        let (push_tx, pushes) = mpsc::unbounded_channel();
        let subscription = client.subscribe_race(race_id, move |race| {
            let _ = push_tx.send(Arc::clone(race));
        });

        let api = api.clone();
        let fetch = tokio::spawn(async move { api.find_race(race_id).await });

        Self {
            tracker: RaceDataTracker::new(race_id, cache),
            pushes,
            fetch: Some(fetch),
            _subscription: subscription,
        }
    }

    fn race_id(&self) -> RaceId {
        self.tracker.race_id()
    }

    /// Wait for the next fetched or pushed revision; `true` when the view changed
    async fn next(&mut self) -> Result<bool> {
        enum Update {
            Pushed(Arc<FullRace>),
            Fetched(ApiResult<Option<FullRace>>),
        }

        let update = tokio::select! {
            Some(race) = self.pushes.recv() => Update::Pushed(race),
            fetched = fetch_result(&mut self.fetch) => Update::Fetched(fetched),
        };

        let changed = match update {
            Update::Pushed(race) => self.tracker.offer(race, SnapshotSource::Pushed)?,
            Update::Fetched(outcome) => {
                self.fetch = None;
                self.tracker.record_fetch(outcome)?
            }
        };
        Ok(changed)
    }

    fn print(&self) {
        match self.tracker.current() {
            TrackedRace::Loading => {}
            TrackedRace::NotFound => {
                println!("Race {} not found, waiting for live updates", self.race_id())
            }
            TrackedRace::Failed(err) => {
                println!("Race {} unavailable: {}", self.race_id(), err)
            }
            TrackedRace::Ready(snapshot) => {
                print!(
                    "{}",
                    render::render_race(&snapshot.race, &snapshot.computation, now_millis())
                );
            }
        }
    }
}

impl Drop for RaceView {
    fn drop(&mut self) {
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
    }
}

async fn fetch_result(
    fetch: &mut Option<JoinHandle<ApiResult<Option<FullRace>>>>,
) -> ApiResult<Option<FullRace>> {
    match fetch {
        Some(handle) => handle
            .await
            .unwrap_or_else(|e| Err(ApiError::fetch_failed(e.to_string()))),
        None => pending().await,
    }
}

async fn next_change(view: &mut Option<RaceView>) -> Result<bool> {
    match view {
        Some(view) => view.next().await,
        None => pending().await,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use scoreapp_core::{LapStatsOptions, LiveConfig};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dropped_view_aborts_snapshot_fetch() {
        timeout(Duration::from_secs(5), async {
            // Accepts the snapshot request and never answers it
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let api = RaceApi::new(&ApiConfig {
                rest_url: format!("http://{}", listener.local_addr().unwrap()),
                auth_token: None,
                request_timeout_ms: 60_000,
            })
            .unwrap();
            let client = LiveClient::spawn(&LiveConfig {
                url: None,
                ..LiveConfig::default()
            })
            .unwrap();
            let cache = Arc::new(RaceStatsCache::new(LapStatsOptions::default()));

            let view = RaceView::open(&client, &api, cache, 7);
            let (mut socket, _) = listener.accept().await.unwrap();
            drop(view);

            let mut buffer = [0u8; 1024];
            loop {
                match socket.read(&mut buffer).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            client.shutdown().await;
        })
        .await
        .expect("fetch kept running after the view was dropped");
    }
}
