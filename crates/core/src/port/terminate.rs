// Terminate Signal - request from the bridge to a supervised process

use tokio::sync::watch;

/// Receiving side, held by whatever supervises the child process
#[derive(Clone)]
pub struct TerminateToken {
    rx: watch::Receiver<bool>,
}

impl TerminateToken {
    /// Check if termination was requested
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for a termination request
    ///
    /// Also returns once every sender is gone: nobody is left to observe
    /// the process, so it should be stopped.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Sending side, held by the session
pub struct TerminateSender {
    tx: watch::Sender<bool>,
}

impl TerminateSender {
    /// Request termination. Returns false if it had already been requested.
    pub fn request(&self) -> bool {
        self.tx.send_if_modified(|requested| {
            if *requested {
                false
            } else {
                *requested = true;
                true
            }
        })
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Create a terminate channel
pub fn terminate_channel() -> (TerminateSender, TerminateToken) {
    let (tx, rx) = watch::channel(false);
    (TerminateSender { tx }, TerminateToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_request_is_idempotent() {
        let (sender, token) = terminate_channel();

        assert!(!token.is_requested());
        assert!(sender.request());
        assert!(!sender.request());
        assert!(token.is_requested());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_request() {
        let (sender, mut token) = terminate_channel();

        let waiter = tokio::spawn(async move {
            token.wait().await;
        });
        sender.request();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_when_sender_dropped() {
        let (sender, mut token) = terminate_channel();
        drop(sender);

        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .expect("wait should return once the sender is gone");
    }
}
