//! Drives a [`foca::Foca`] SWIM instance over a UDP socket in a dedicated
//! task, translating its membership notifications into [`ClusterEvent`]s
//! and exposing a small command channel ([`ClusterHandle`]) for the rest of
//! the process to join seeds and read the current membership. Wire traffic
//! is sealed with [`crate::secret_codec::SecretCodec`], keyed off the
//! cluster's shared secret.
//!
//! Foca callbacks (timer scheduling, outbound sends) run synchronously
//! inside `handle_data`/`handle_timer`/`announce`; this task is the only
//! thing that ever touches the `Foca` instance, so there's no ring lock to
//! contend here at all — membership state lives entirely on this task and
//! is published out via a [`watch`] channel, per the actor-over-shared-lock
//! design note.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use foca::{Config, Foca, Notification, Runtime, Timer};
use rand::SeedableRng;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use crate::membership::{Member, MemberInfo, MembershipSnapshot};
use crate::secret_codec::SecretCodec;

const MAX_PACKET_SIZE: usize = 64 * 1024;

type FocaInstance = Foca<Member, SecretCodec, rand::rngs::StdRng, foca::NoCustomBroadcast>;

/// Requests the gossip actor accepts from the rest of the process.
pub enum ClusterCommand {
    /// Attempt to join the cluster through this seed address.
    Join(SocketAddr),
    Shutdown,
}

/// What the gossip actor reports as membership changes, consumed by
/// whichever task owns the ring/problem-tracker (see `cluster_store.rs`).
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    MemberUp(String),
    MemberDown(String),
}

/// A handle to the running gossip actor: send it commands, watch its
/// published membership snapshot, and receive membership change events.
#[derive(Clone)]
pub struct ClusterHandle {
    commands: mpsc::UnboundedSender<ClusterCommand>,
    snapshot: watch::Receiver<MembershipSnapshot>,
}

impl ClusterHandle {
    pub fn join(&self, seed: SocketAddr) {
        let _ = self.commands.send(ClusterCommand::Join(seed));
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(ClusterCommand::Shutdown);
    }

    pub fn snapshot(&self) -> MembershipSnapshot {
        self.snapshot.borrow().clone()
    }
}

/// Accumulates the side effects foca's `Runtime` callbacks produce during
/// one `handle_data`/`handle_timer`/`announce` call, so the actor loop can
/// drain and act on them (send datagrams, schedule timers) after foca
/// returns rather than from inside the callback itself.
struct BufferedRuntime {
    to_send: Vec<(Member, Vec<u8>)>,
    to_schedule: Vec<(Timer<Member>, Duration)>,
    notifications: Vec<Notification<Member>>,
}

impl BufferedRuntime {
    fn new() -> Self {
        BufferedRuntime {
            to_send: Vec::new(),
            to_schedule: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

impl Runtime<Member> for BufferedRuntime {
    fn notify_renewed(&mut self, _renewed: Member) {}

    fn send_to(&mut self, to: Member, data: &[u8]) {
        self.to_send.push((to, data.to_vec()));
    }

    fn submit_after(&mut self, event: Timer<Member>, after: Duration) {
        self.to_schedule.push((event, after));
    }

    fn notify(&mut self, notification: Notification<Member>) {
        self.notifications.push(notification);
    }
}

/// Spawns the gossip actor bound to `bind_addr`, identified as `identity`.
/// Returns a handle for the rest of the process plus a channel the cluster
/// store subscribes to for membership-change events.
pub fn spawn(
    identity: Member,
    bind_addr: SocketAddr,
    secret: Vec<u8>,
) -> std::io::Result<(ClusterHandle, mpsc::UnboundedReceiver<ClusterEvent>)> {
    let socket = std::net::UdpSocket::bind(bind_addr)?;
    socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(socket)?;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(MembershipSnapshot::single_node(identity.name.clone()));

    tokio::spawn(run(identity, socket, secret, command_rx, event_tx, snapshot_tx));

    Ok((
        ClusterHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        },
        event_rx,
    ))
}

async fn run(
    identity: Member,
    socket: UdpSocket,
    secret: Vec<u8>,
    mut commands: mpsc::UnboundedReceiver<ClusterCommand>,
    events: mpsc::UnboundedSender<ClusterEvent>,
    snapshot_tx: watch::Sender<MembershipSnapshot>,
) {
    let config = Config::simple();
    let codec = SecretCodec::new(&secret);
    let mut foca: FocaInstance = Foca::new(identity.clone(), config, rand::rngs::StdRng::from_os_rng(), codec);

    // (fire time, timer) pairs; scanned on every tick rather than kept in a
    // proper timer wheel since the gossip period is coarse (seconds) and
    // membership sizes here are small.
    let mut timers: Vec<(Instant, Timer<Member>)> = Vec::new();
    let mut recv_buf = vec![0u8; MAX_PACKET_SIZE];
    let mut tick = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            Some(command) = commands.recv() => {
                match command {
                    ClusterCommand::Join(seed) => {
                        let seed_member = Member::new(format!("seed-{seed}"), seed);
                        let mut runtime = BufferedRuntime::new();
                        if foca.announce(seed_member, &mut runtime).is_ok() {
                            drain(runtime, &socket, &mut timers).await;
                        }
                    }
                    ClusterCommand::Shutdown => break,
                }
            }
            received = socket.recv_from(&mut recv_buf) => {
                if let Ok((len, _from)) = received {
                    let mut runtime = BufferedRuntime::new();
                    if foca.handle_data(&recv_buf[..len], &mut runtime).is_ok() {
                        let notifications = drain(runtime, &socket, &mut timers).await;
                        publish(&identity, &foca, &notifications, &events, &snapshot_tx);
                    }
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                let due: Vec<_> = {
                    let mut due = Vec::new();
                    timers.retain(|(at, timer)| {
                        if *at <= now {
                            due.push(timer.clone());
                            false
                        } else {
                            true
                        }
                    });
                    due
                };
                let mut all_notifications = Vec::new();
                for timer in due {
                    let mut runtime = BufferedRuntime::new();
                    if foca.handle_timer(timer, &mut runtime).is_ok() {
                        all_notifications.extend(drain(runtime, &socket, &mut timers).await);
                    }
                }
                if !all_notifications.is_empty() {
                    publish(&identity, &foca, &all_notifications, &events, &snapshot_tx);
                }
            }
        }
    }
}

/// Sends every buffered outbound datagram and schedules every buffered
/// timer, returning the notifications foca raised during the call.
async fn drain(
    runtime: BufferedRuntime,
    socket: &UdpSocket,
    timers: &mut Vec<(Instant, Timer<Member>)>,
) -> Vec<Notification<Member>> {
    for (to, data) in runtime.to_send {
        let _ = socket.send_to(&data, to.addr).await;
    }
    let now = Instant::now();
    for (timer, after) in runtime.to_schedule {
        timers.push((now + after, timer));
    }
    runtime.notifications
}

fn publish(
    identity: &Member,
    foca: &FocaInstance,
    notifications: &[Notification<Member>],
    events: &mpsc::UnboundedSender<ClusterEvent>,
    snapshot_tx: &watch::Sender<MembershipSnapshot>,
) {
    for notification in notifications {
        match notification {
            Notification::MemberUp(member) => {
                let _ = events.send(ClusterEvent::MemberUp(member.name.clone()));
            }
            Notification::MemberDown(member) => {
                let _ = events.send(ClusterEvent::MemberDown(member.name.clone()));
            }
            _ => {}
        }
    }

    let members: BTreeMap<String, SocketAddr> = foca
        .iter_members()
        .map(|m| (m.name.clone(), m.addr))
        .collect();
    let snapshot = MembershipSnapshot {
        name: identity.name.clone(),
        protocol_version: 1,
        members: members
            .into_iter()
            .map(|(name, addr)| MemberInfo {
                name,
                addr: addr.to_string(),
            })
            .collect(),
    };
    let _ = snapshot_tx.send(snapshot);
}
