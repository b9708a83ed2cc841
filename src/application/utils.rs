use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Receiving end of the external stop switch. `true` means stop.
pub type StopSignal = watch::Receiver<bool>;

/// A stop signal that never fires, for one-shot runs and tests.
pub fn never_stop() -> StopSignal {
    let (tx, rx) = watch::channel(false);
    drop(tx);
    rx
}

/// Wait for `duration`, returning early with `true` if a stop was requested.
pub async fn wait_with_abort(duration: Duration, stop: &mut StopSignal) -> bool {
    if *stop.borrow() {
        return true;
    }

    let delay = sleep(duration);
    tokio::pin!(delay);

    loop {
        tokio::select! {
            _ = &mut delay => return false,
            changed = stop.changed() => match changed {
                Ok(()) => {
                    if *stop.borrow_and_update() {
                        return true;
                    }
                }
                // Sender gone: nobody can stop us anymore.
                Err(_) => {
                    (&mut delay).await;
                    return false;
                }
            },
        }
    }
}
