//! Background move search with a synchronous fallback.
//!
//! The [`Coordinator`] forwards each move request to a worker thread as a FEN
//! snapshot and later applies the answer to the caller's board. Requests
//! carry increasing ids and only the latest one is ever applied. When the
//! worker is missing, dies, fails or misses the deadline, the same search
//! runs in the caller's thread instead, so a request always resolves.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::board::Board;
use crate::engine::{self, SearchRequest, SearchResponse, Strategy};
use crate::moves::Move;
use crate::piece::Color;

/// Why a request was served in the caller's thread.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FallbackReason {
    /// No worker could be started, or the request could not be handed to it.
    BackgroundUnavailable,
    /// The worker did not answer before the deadline.
    Timeout,
    /// The worker reported a failure or went away.
    WorkerFailed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Source {
    Background,
    Fallback(FallbackReason),
}

/// A settled request. `mv` is the move that was applied to the board, or
/// `None` when the position had no move to play.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Resolution {
    pub id: u64,
    pub mv: Option<Move>,
    pub source: Source,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Poll {
    Idle,
    Pending,
    Ready(Resolution),
}

/// Message from the worker thread back to the coordinator.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum WorkerReply {
    Done(SearchResponse),
    Failed { id: u64, message: String },
}

impl WorkerReply {
    fn id(&self) -> u64 {
        match self {
            WorkerReply::Done(response) => response.id,
            WorkerReply::Failed { id, .. } => *id,
        }
    }
}

struct Worker {
    requests: Sender<SearchRequest>,
    replies: Receiver<WorkerReply>,
}

impl Worker {
    fn spawn() -> std::io::Result<Worker> {
        let (request_tx, request_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();
        thread::Builder::new()
            .name("chess-search".to_string())
            .spawn(move || worker_loop(request_rx, reply_tx))?;
        Ok(Worker {
            requests: request_tx,
            replies: reply_rx,
        })
    }
}

/// Serve requests until the coordinator hangs up.
fn worker_loop(requests: Receiver<SearchRequest>, replies: Sender<WorkerReply>) {
    for request in requests.iter() {
        let id = request.id;
        let reply = match panic::catch_unwind(AssertUnwindSafe(|| engine::run_request(&request))) {
            Ok(Ok(response)) => WorkerReply::Done(response),
            Ok(Err(e)) => WorkerReply::Failed {
                id,
                message: e.to_string(),
            },
            Err(payload) => WorkerReply::Failed {
                id,
                message: panic_message(payload.as_ref()),
            },
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    debug!("search worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("search panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("search panicked: {s}")
    } else {
        "search panicked".to_string()
    }
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    id: u64,
    strategy: Strategy,
    depth: u32,
    ai_color: Color,
    /// Unset when the request never reached a worker.
    deadline: Option<Instant>,
    /// Fallback owed on the next poll or wait.
    deferred: Option<FallbackReason>,
}

#[derive(Clone, Copy, Debug)]
enum State {
    Idle,
    Awaiting(Pending),
}

pub struct Coordinator {
    timeout: Duration,
    last_id: u64,
    spawn_workers: bool,
    worker: Option<Worker>,
    state: State,
}

impl Coordinator {
    /// A coordinator backed by a worker thread. Falls back to running
    /// without one if the thread cannot be started; wasm32 never has one.
    pub fn new(timeout: Duration) -> Self {
        let mut coordinator = Coordinator {
            timeout,
            last_id: 0,
            spawn_workers: cfg!(not(target_arch = "wasm32")),
            worker: None,
            state: State::Idle,
        };
        coordinator.ensure_worker();
        coordinator
    }

    /// A coordinator that serves every request in the caller's thread.
    pub fn without_worker(timeout: Duration) -> Self {
        Coordinator {
            timeout,
            last_id: 0,
            spawn_workers: false,
            worker: None,
            state: State::Idle,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applies to requests made after the call.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Id of the request still waiting to be resolved, if any.
    pub fn outstanding(&self) -> Option<u64> {
        match self.state {
            State::Idle => None,
            State::Awaiting(pending) => Some(pending.id),
        }
    }

    fn ensure_worker(&mut self) {
        if !self.spawn_workers || self.worker.is_some() {
            return;
        }
        match Worker::spawn() {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => warn!(error = %e, "could not start search worker"),
        }
    }

    /// Ask for a move in `board`'s position. Returns the request id.
    ///
    /// Never searches in the caller's thread: if the worker is unavailable
    /// the fallback runs on the next [`poll`](Self::poll) or
    /// [`wait`](Self::wait). A request made while another is outstanding
    /// supersedes it.
    pub fn request(&mut self, board: &Board, strategy: Strategy, depth: u32, ai_color: Color) -> u64 {
        if let State::Awaiting(old) = self.state {
            debug!(superseded = old.id, "superseding outstanding request");
        }

        self.last_id += 1;
        let id = self.last_id;
        self.ensure_worker();

        let request = SearchRequest {
            id,
            position: board.to_fen(),
            strategy,
            depth,
            ai_color,
        };

        let sent = match &self.worker {
            Some(worker) => worker.requests.send(request).is_ok(),
            None => false,
        };

        let (deadline, deferred) = if sent {
            debug!(id, %strategy, depth, "request sent to search worker");
            (Some(Instant::now() + self.timeout), None)
        } else {
            if self.worker.take().is_some() {
                warn!(id, "search worker hung up");
            }
            (None, Some(FallbackReason::BackgroundUnavailable))
        };

        self.state = State::Awaiting(Pending {
            id,
            strategy,
            depth,
            ai_color,
            deadline,
            deferred,
        });
        id
    }

    /// Check for an answer without blocking.
    pub fn poll(&mut self, board: &mut Board) -> Poll {
        let State::Awaiting(pending) = self.state else {
            return Poll::Idle;
        };
        if let Some(reason) = pending.deferred {
            return Poll::Ready(self.fall_back(board, pending, reason));
        }

        loop {
            let received = match &self.worker {
                Some(worker) => worker.replies.try_recv(),
                None => Err(TryRecvError::Disconnected),
            };
            match received {
                Ok(reply) => {
                    if let Some(resolution) = self.handle_reply(reply, pending, board) {
                        return Poll::Ready(resolution);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.worker = None;
                    return Poll::Ready(self.fall_back(board, pending, FallbackReason::WorkerFailed));
                }
            }
        }

        match pending.deadline {
            Some(deadline) if Instant::now() < deadline => Poll::Pending,
            _ => Poll::Ready(self.fall_back(board, pending, FallbackReason::Timeout)),
        }
    }

    /// Block until the outstanding request resolves, at most until its
    /// deadline. Returns `None` if nothing was outstanding.
    pub fn wait(&mut self, board: &mut Board) -> Option<Resolution> {
        loop {
            let State::Awaiting(pending) = self.state else {
                return None;
            };
            if let Some(reason) = pending.deferred {
                return Some(self.fall_back(board, pending, reason));
            }
            let Some(deadline) = pending.deadline else {
                return Some(self.fall_back(board, pending, FallbackReason::BackgroundUnavailable));
            };

            let received = match &self.worker {
                Some(worker) => worker.replies.recv_deadline(deadline),
                None => Err(RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(reply) => {
                    if let Some(resolution) = self.handle_reply(reply, pending, board) {
                        return Some(resolution);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Some(self.fall_back(board, pending, FallbackReason::Timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.worker = None;
                    return Some(self.fall_back(board, pending, FallbackReason::WorkerFailed));
                }
            }
        }
    }

    /// Settle `pending` from a worker reply. Replies for any other id are
    /// dropped and leave the state untouched.
    fn handle_reply(&mut self, reply: WorkerReply, pending: Pending, board: &mut Board) -> Option<Resolution> {
        if reply.id() != pending.id {
            debug!(stale = reply.id(), current = pending.id, "dropping stale search reply");
            return None;
        }
        match reply {
            WorkerReply::Done(response) => Some(self.resolve(board, pending.id, response.mv, Source::Background)),
            WorkerReply::Failed { message, .. } => {
                warn!(id = pending.id, %message, "search worker failed");
                Some(self.fall_back(board, pending, FallbackReason::WorkerFailed))
            }
        }
    }

    /// Run the request's search in this thread against the current board.
    fn fall_back(&mut self, board: &mut Board, pending: Pending, reason: FallbackReason) -> Resolution {
        warn!(id = pending.id, ?reason, "searching in the foreground");
        let request = SearchRequest {
            id: pending.id,
            position: board.to_fen(),
            strategy: pending.strategy,
            depth: pending.depth,
            ai_color: pending.ai_color,
        };
        let mv = match engine::run_request(&request) {
            Ok(response) => response.mv,
            Err(e) => {
                error!(id = pending.id, error = %e, "foreground search failed");
                None
            }
        };
        self.resolve(board, pending.id, mv, Source::Fallback(reason))
    }

    fn resolve(&mut self, board: &mut Board, id: u64, mv: Option<Move>, source: Source) -> Resolution {
        self.state = State::Idle;

        let applied = match mv {
            Some(m) => {
                let ok = board.apply_move(&m);
                debug_assert!(ok, "search returned illegal move {m}");
                if ok {
                    Some(m)
                } else {
                    error!(id, mv = %m, "search returned a move the board rejects");
                    None
                }
            }
            None => None,
        };

        match applied {
            Some(m) => info!(id, mv = %m, ?source, "AI move applied"),
            None => info!(id, ?source, "AI has no move"),
        }
        Resolution { id, mv: applied, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rules;

    const MIDDLEGAME: &str = "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4";

    fn board(fen: &str) -> Board {
        Board::from_fen(fen).unwrap()
    }

    fn long() -> Duration {
        Duration::from_secs(60)
    }

    #[test]
    fn worker_and_fallback_choose_the_same_move() {
        for (strategy, depth) in [(Strategy::Greedy, 1), (Strategy::Minimax, 2)] {
            let mut background = board(MIDDLEGAME);
            let mut foreground = board(MIDDLEGAME);

            let mut with_worker = Coordinator::new(long());
            assert!(with_worker.has_worker());
            with_worker.request(&background, strategy, depth, Color::White);
            let a = with_worker.wait(&mut background).unwrap();

            let mut no_worker = Coordinator::without_worker(long());
            no_worker.request(&foreground, strategy, depth, Color::White);
            let b = no_worker.wait(&mut foreground).unwrap();

            assert_eq!(a.source, Source::Background);
            assert_eq!(b.source, Source::Fallback(FallbackReason::BackgroundUnavailable));
            assert!(a.mv.is_some());
            assert_eq!(a.mv, b.mv, "{strategy} disagreed");
            assert_eq!(background.to_fen(), foreground.to_fen());
        }
    }

    #[test]
    fn request_without_worker_defers_the_search() {
        let mut b = board(MIDDLEGAME);
        let before = b.to_fen();
        let mut coordinator = Coordinator::without_worker(long());

        let id = coordinator.request(&b, Strategy::Greedy, 1, Color::White);
        assert_eq!(b.to_fen(), before, "request must not touch the board");
        assert_eq!(coordinator.outstanding(), Some(id));

        match coordinator.poll(&mut b) {
            Poll::Ready(resolution) => {
                assert_eq!(resolution.id, id);
                assert_eq!(resolution.source, Source::Fallback(FallbackReason::BackgroundUnavailable));
                assert!(resolution.mv.is_some());
            }
            other => panic!("expected a fallback resolution, got {other:?}"),
        }
        assert_ne!(b.to_fen(), before);
        assert_eq!(coordinator.poll(&mut b), Poll::Idle);
        assert_eq!(coordinator.wait(&mut b), None);
    }

    /// A coordinator whose worker end is held by the test.
    fn scripted(timeout: Duration) -> (Coordinator, Receiver<SearchRequest>, Sender<WorkerReply>) {
        let (request_tx, request_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();
        let coordinator = Coordinator {
            timeout,
            last_id: 0,
            spawn_workers: false,
            worker: Some(Worker {
                requests: request_tx,
                replies: reply_rx,
            }),
            state: State::Idle,
        };
        (coordinator, request_rx, reply_tx)
    }

    #[test]
    fn missed_deadline_falls_back_and_late_reply_is_dropped() {
        let mut b = board(MIDDLEGAME);
        let (mut coordinator, requests, replies) = scripted(Duration::ZERO);

        let first = coordinator.request(&b, Strategy::Minimax, 3, Color::White);
        let Poll::Ready(resolution) = coordinator.poll(&mut b) else {
            panic!("a zero timeout must resolve on the first poll");
        };
        assert_eq!(resolution.id, first);
        assert_eq!(resolution.source, Source::Fallback(FallbackReason::Timeout));

        let mut expected = board(MIDDLEGAME);
        let best = engine::minimax_move(&mut expected, 3, Color::White).unwrap();
        assert_eq!(resolution.mv, Some(best.mv));
        assert_eq!(b.to_fen(), expected_after(MIDDLEGAME, best.mv));

        coordinator.set_timeout(long());
        let second = coordinator.request(&b, Strategy::Greedy, 1, Color::Black);
        let black_moves = b.legal_moves();

        // The first search finishes late, after the second request went out.
        replies
            .send(WorkerReply::Done(SearchResponse { id: first, mv: Some(black_moves[0]) }))
            .unwrap();
        replies
            .send(WorkerReply::Done(SearchResponse { id: second, mv: Some(black_moves[1]) }))
            .unwrap();

        let resolution = coordinator.wait(&mut b).unwrap();
        assert_eq!(resolution.id, second);
        assert_eq!(resolution.source, Source::Background);
        assert_eq!(resolution.mv, Some(black_moves[1]));
        assert_eq!(b.last_move, Some((black_moves[1].from, black_moves[1].to)));
        assert_eq!(b.side_to_move(), Color::White);

        let sent: Vec<u64> = requests.try_iter().map(|r| r.id).collect();
        assert_eq!(sent, vec![first, second]);
    }

    fn expected_after(fen: &str, mv: Move) -> String {
        let mut b = board(fen);
        assert!(b.apply_move(&mv));
        b.to_fen()
    }

    #[test]
    fn stale_reply_leaves_board_and_state_alone() {
        let mut b = board(MIDDLEGAME);
        let before = b.to_fen();
        let mut coordinator = Coordinator::without_worker(long());
        coordinator.request(&b, Strategy::Greedy, 1, Color::White);
        let current = coordinator.request(&b, Strategy::Greedy, 1, Color::White);

        let State::Awaiting(pending) = coordinator.state else {
            panic!("request must leave the coordinator awaiting");
        };
        let stale = WorkerReply::Done(SearchResponse {
            id: current - 1,
            mv: Some(Move::new((1, 0), (2, 0))),
        });
        assert_eq!(coordinator.handle_reply(stale, pending, &mut b), None);
        assert_eq!(b.to_fen(), before);
        assert_eq!(coordinator.outstanding(), Some(current));
    }

    #[test]
    fn matching_reply_is_applied() {
        let mut b = board(MIDDLEGAME);
        let mut coordinator = Coordinator::without_worker(long());
        let id = coordinator.request(&b, Strategy::Random, 1, Color::White);
        let State::Awaiting(pending) = coordinator.state else {
            panic!("request must leave the coordinator awaiting");
        };

        let a3 = Move::new((1, 0), (2, 0));
        let reply = WorkerReply::Done(SearchResponse { id, mv: Some(a3) });
        let resolution = coordinator.handle_reply(reply, pending, &mut b).unwrap();
        assert_eq!(resolution.mv, Some(a3));
        assert_eq!(resolution.source, Source::Background);
        assert_eq!(b.squares[2][0].map(|p| p.color), Some(Color::White));
        assert_eq!(coordinator.outstanding(), None);
    }

    #[test]
    fn failed_reply_falls_back() {
        let mut b = board(MIDDLEGAME);
        let mut coordinator = Coordinator::without_worker(long());
        let id = coordinator.request(&b, Strategy::Greedy, 1, Color::White);
        let State::Awaiting(pending) = coordinator.state else {
            panic!("request must leave the coordinator awaiting");
        };

        let reply = WorkerReply::Failed {
            id,
            message: "boom".to_string(),
        };
        let resolution = coordinator.handle_reply(reply, pending, &mut b).unwrap();
        assert_eq!(resolution.source, Source::Fallback(FallbackReason::WorkerFailed));
        assert!(resolution.mv.is_some());
    }

    #[test]
    fn worker_reports_unparsable_snapshot() {
        let (request_tx, request_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();
        let handle = thread::spawn(move || worker_loop(request_rx, reply_tx));

        request_tx
            .send(SearchRequest {
                id: 3,
                position: "garbage".to_string(),
                strategy: Strategy::Greedy,
                depth: 1,
                ai_color: Color::White,
            })
            .unwrap();
        match reply_rx.recv().unwrap() {
            WorkerReply::Failed { id, message } => {
                assert_eq!(id, 3);
                assert!(message.contains("garbage"), "{message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        drop(request_tx);
        handle.join().unwrap();
    }

    #[test]
    fn finished_game_resolves_without_a_move() {
        let mut b = board("R6k/6pp/8/8/8/8/8/K7 b - - 0 1");
        let mut coordinator = Coordinator::new(long());
        let id = coordinator.request(&b, Strategy::Minimax, 2, Color::Black);
        let resolution = coordinator.wait(&mut b).unwrap();
        assert_eq!(resolution.id, id);
        assert_eq!(resolution.mv, None);
        assert_eq!(coordinator.outstanding(), None);
    }

    #[test]
    fn ids_increase() {
        let b = board(MIDDLEGAME);
        let mut coordinator = Coordinator::without_worker(long());
        let a = coordinator.request(&b, Strategy::Random, 1, Color::White);
        let c = coordinator.request(&b, Strategy::Random, 1, Color::White);
        assert!(c > a);
    }
}
