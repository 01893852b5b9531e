//! Call-and-wait submission to an actor mailbox.
//!
//! Hub and channel actors own their state exclusively and mutate it only
//! from their own loop. Everyone else sends a command carrying a oneshot
//! reply sender and waits for the loop to answer:
//!
//! ```text
//! caller ──cmd(response_tx)──► mailbox ──► actor loop
//!   ▲                                         │
//!   └─────────────── response_rx ◄────────────┘
//! ```
//!
//! Commands to one actor run in arrival order and never overlap the
//! actor's own timer work. If the loop has stopped, the send or the reply
//! fails and the caller gets [`Error::ActorGone`] instead of waiting
//! forever.

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

/// Send the command built by `build` and wait for the actor's reply.
pub(crate) async fn submit<C, T>(
    mailbox: &mpsc::Sender<C>,
    actor: &'static str,
    build: impl FnOnce(oneshot::Sender<T>) -> C,
) -> Result<T> {
    let (response_tx, response_rx) = oneshot::channel();
    mailbox
        .send(build(response_tx))
        .await
        .map_err(|_| Error::ActorGone(actor))?;
    response_rx.await.map_err(|_| Error::ActorGone(actor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum Command {
        Add {
            value: u32,
            response_tx: oneshot::Sender<u32>,
        },
    }

    #[tokio::test]
    async fn test_submit_waits_for_reply() {
        let (tx, mut rx) = mpsc::channel(4);

        let actor = tokio::spawn(async move {
            let mut total = 0;
            while let Some(Command::Add { value, response_tx }) = rx.recv().await {
                total += value;
                let _ = response_tx.send(total);
            }
        });

        assert_eq!(submit(&tx, "adder", |response_tx| Command::Add { value: 2, response_tx }).await.unwrap(), 2);
        assert_eq!(submit(&tx, "adder", |response_tx| Command::Add { value: 3, response_tx }).await.unwrap(), 5);

        drop(tx);
        actor.await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_to_stopped_actor() {
        let (tx, rx) = mpsc::channel::<Command>(4);
        drop(rx);

        let err = submit(&tx, "adder", |response_tx| Command::Add { value: 1, response_tx })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ActorGone("adder")));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_actor_gone() {
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(async move {
            // Receive and drop without answering.
            let _ = rx.recv().await;
        });

        let err = submit(&tx, "adder", |response_tx| Command::Add { value: 1, response_tx })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "adder actor is not running");
    }
}
