//! Subcommands and their execution.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::Subcommand;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use hostkeeper::credentials::StoredSession;
use hostkeeper::gateway::fake::{DEMO_HOST, DEMO_OTHER_HOSTS};
use hostkeeper::{
    ClientConfig, CredentialStore, HostDto, HostId, HostProfile, LoginFlow, LoginOutcome,
    LogoutReason, RemoteGateway, SessionController, SessionCredentials, SessionPhase,
};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new host and log in as it
    Register,

    /// Log in as an existing host
    Login {
        /// Host UUID (defaults to the stored one)
        #[arg(long)]
        host: Option<HostId>,
    },

    /// Show the current profile
    Show {
        /// Print the wire JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Flip "only friends may connect"
    ToggleOnlyFriends,

    /// Flip "allow hosts without a name"
    ToggleAllowNonames,

    /// Add a host to the friend list
    Befriend { host: HostId },

    /// Remove a host from the friend list
    Unfriend { host: HostId },

    /// Add a host to the ban list
    Ban { host: HostId },

    /// Remove a host from the ban list
    Unban { host: HostId },

    /// Keep the session alive and print profile changes until logout or Ctrl-C
    Watch,

    /// Run a scripted session against the in-memory backend
    Demo,
}

/// Everything a command needs.
pub struct Context {
    pub gateway: Arc<dyn RemoteGateway>,
    pub credentials: Arc<dyn CredentialStore>,
    pub config: ClientConfig,
}

impl Context {
    fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(
            self.gateway.clone(),
            self.credentials.clone(),
            self.config.session.clone(),
        )
    }

    async fn start_session(
        &self,
        credentials: SessionCredentials,
    ) -> Result<(SessionController, UnboundedReceiver<LogoutReason>)> {
        let (session, mut logouts) = SessionController::start(
            self.gateway.clone(),
            self.credentials.clone(),
            self.config.session.clone(),
            credentials,
        )
        .await?;

        if session.phase() == SessionPhase::LoggedOut {
            return Err(ended(&mut logouts));
        }
        Ok((session, logouts))
    }

    /// Resume the session a previous login stored.
    async fn resume(&self) -> Result<(SessionController, UnboundedReceiver<LogoutReason>)> {
        let stored = StoredSession::load(self.credentials.as_ref())
            .context("Failed to read stored credentials")?
            .ok_or_else(|| anyhow!("Not logged in; run `hostkeeper login` or `hostkeeper register`"))?;

        let host = stored.host_id;
        let credentials = stored.into_credentials().ok_or_else(|| {
            anyhow!("Stored token expired; run `hostkeeper login --host {}`", host)
        })?;

        self.start_session(credentials).await
    }
}

/// Error for a session that ended, carrying the user-facing reason.
fn ended(logouts: &mut UnboundedReceiver<LogoutReason>) -> anyhow::Error {
    match logouts.try_recv() {
        Ok(reason) => anyhow!("Logged out: {}", reason.message()),
        Err(_) => anyhow!("Session is closed"),
    }
}

fn render(profile: &HostProfile) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "Host:          {}", profile.host_id())?;
    writeln!(out, "Only friends:  {}", profile.only_friends())?;
    writeln!(out, "Allow nonames: {}", profile.allow_nonames())?;
    writeln!(out, "Friends ({}):", profile.friends().len())?;
    for friend in profile.friends() {
        writeln!(out, "  {}", friend)?;
    }
    write!(out, "Banned ({}):", profile.banlist().len())?;
    for banned in profile.banlist() {
        write!(out, "\n  {}", banned)?;
    }
    Ok(out)
}

/// A host never appears on its own friend or ban list.
fn ensure_other(session: &SessionController, host: HostId) -> Result<()> {
    if host == session.host_id() {
        session.close();
        bail!("{} is this host", host);
    }
    Ok(())
}

fn login_result(outcome: LoginOutcome) -> Result<SessionCredentials> {
    match outcome {
        LoginOutcome::LoggedIn(credentials) => Ok(credentials),
        LoginOutcome::Rejected(reason) => bail!("{}", reason.message()),
        LoginOutcome::Busy => bail!("Another login is in progress"),
    }
}

/// Execute a command and return its output.
pub async fn execute(ctx: &Context, command: Command) -> Result<String> {
    match command {
        Command::Register => {
            let credentials = login_result(ctx.login_flow().register().await?)?;
            Ok(format!("Registered host {}", credentials.host_id))
        }

        Command::Login { host } => {
            let host = match host {
                Some(host) => host,
                None => StoredSession::load(ctx.credentials.as_ref())?
                    .map(|stored| stored.host_id)
                    .ok_or_else(|| anyhow!("No stored host; pass --host"))?,
            };
            let credentials = login_result(ctx.login_flow().login(host).await?)?;
            Ok(format!("Logged in as {}", credentials.host_id))
        }

        Command::Show { json } => {
            let (session, _logouts) = ctx.resume().await?;
            let profile = session.profile();
            session.close();

            if json {
                Ok(serde_json::to_string_pretty(&HostDto::from(&profile))?)
            } else {
                render(&profile)
            }
        }

        Command::ToggleOnlyFriends => {
            let (session, mut logouts) = ctx.resume().await?;
            let value = session.toggle_only_friends().await?;
            session.close();
            match value {
                Some(value) => Ok(format!("Only friends: {}", value)),
                None => Err(ended(&mut logouts)),
            }
        }

        Command::ToggleAllowNonames => {
            let (session, mut logouts) = ctx.resume().await?;
            let value = session.toggle_allow_nonames().await?;
            session.close();
            match value {
                Some(value) => Ok(format!("Allow nonames: {}", value)),
                None => Err(ended(&mut logouts)),
            }
        }

        Command::Befriend { host } => {
            let (session, mut logouts) = ctx.resume().await?;
            ensure_other(&session, host)?;
            let done = session.befriend(host).await?;
            membership_result(&session, &mut logouts, done, format!("Befriended {}", host))
        }

        Command::Unfriend { host } => {
            let (session, mut logouts) = ctx.resume().await?;
            let done = session.unfriend(host).await?;
            membership_result(&session, &mut logouts, done, format!("Unfriended {}", host))
        }

        Command::Ban { host } => {
            let (session, mut logouts) = ctx.resume().await?;
            ensure_other(&session, host)?;
            let done = session.ban(host).await?;
            membership_result(&session, &mut logouts, done, format!("Banned {}", host))
        }

        Command::Unban { host } => {
            let (session, mut logouts) = ctx.resume().await?;
            let done = session.unban(host).await?;
            membership_result(&session, &mut logouts, done, format!("Unbanned {}", host))
        }

        Command::Watch => {
            let (session, logouts) = ctx.resume().await?;
            watch(session, logouts).await
        }

        Command::Demo => demo(ctx).await,
    }
}

fn membership_result(
    session: &SessionController,
    logouts: &mut UnboundedReceiver<LogoutReason>,
    done: bool,
    message: String,
) -> Result<String> {
    if session.phase() == SessionPhase::LoggedOut {
        return Err(ended(logouts));
    }
    session.close();

    if done {
        Ok(message)
    } else if session.not_found_other() {
        bail!("No such host")
    } else {
        bail!("Host is not on that list")
    }
}

async fn watch(
    session: SessionController,
    mut logouts: UnboundedReceiver<LogoutReason>,
) -> Result<String> {
    let mut profiles = session.subscribe();
    println!("{}", render(&session.profile())?);
    info!(host = %session.host_id(), "Watching session");

    loop {
        tokio::select! {
            reason = logouts.recv() => {
                return match reason {
                    Some(reason) => Err(anyhow!("Logged out: {}", reason.message())),
                    None => Ok("Session ended".to_string()),
                };
            }
            changed = profiles.changed() => {
                if changed.is_err() {
                    return Ok("Session ended".to_string());
                }
                let profile = profiles.borrow_and_update().clone();
                println!("{}", render(&profile)?);
            }
            _ = tokio::signal::ctrl_c() => {
                session.close();
                return Ok("Session closed".to_string());
            }
        }
    }
}

/// Scripted walk through every session operation.
async fn demo(ctx: &Context) -> Result<String> {
    let host: HostId = DEMO_HOST.parse()?;
    let others = DEMO_OTHER_HOSTS
        .iter()
        .map(|raw| raw.parse::<HostId>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let credentials = login_result(ctx.login_flow().login(host).await?)?;
    let (session, mut logouts) = ctx.start_session(credentials).await?;

    let mut out = String::new();
    writeln!(out, "Logged in as {}", session.host_id())?;

    if let Some(value) = session.toggle_only_friends().await? {
        writeln!(out, "Only friends -> {}", value)?;
    }
    if let Some(value) = session.toggle_allow_nonames().await? {
        writeln!(out, "Allow nonames -> {}", value)?;
    }
    for other in &others[..2] {
        writeln!(out, "Befriend {} -> {}", other, session.befriend(*other).await?)?;
    }
    writeln!(out, "Ban {} -> {}", others[2], session.ban(others[2]).await?)?;

    let stranger = HostId::random();
    let found = session.befriend(stranger).await?;
    writeln!(
        out,
        "Befriend {} -> {} (not found: {})",
        stranger,
        found,
        session.not_found_other()
    )?;
    writeln!(out, "Unfriend {} -> {}", others[3], session.unfriend(others[3]).await?)?;
    writeln!(out, "Unban {} -> {}", others[2], session.unban(others[2]).await?)?;

    session.refresh().await?;
    if session.phase() == SessionPhase::LoggedOut {
        return Err(ended(&mut logouts));
    }

    writeln!(out)?;
    out.push_str(&render(&session.profile())?);
    session.close();
    Ok(out)
}
