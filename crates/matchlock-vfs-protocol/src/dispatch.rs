//! Maps wire requests onto `VfsProvider` calls and wire responses back.

use std::sync::Arc;

use matchlock_vfs::{VfsError, VfsProvider};
use tracing::warn;

use crate::handles::HandleRegistry;
use crate::message::{Op, Request, Response, WireDirEntry, WireStat};

/// A provider view that additionally forwards caller identity, for
/// providers that want to see the guest's uid/gid rather than the
/// host process identity (used by the interception layer).
pub trait CallerAware: Send + Sync {
    fn set_caller(&self, uid: u32, gid: u32);
}

/// Dispatches requests against one provider, owning the handle
/// registry that translates guest handle integers to provider handles.
pub struct Dispatcher {
    provider: Arc<dyn VfsProvider>,
    caller_aware: Option<Arc<dyn CallerAware>>,
    handles: HandleRegistry,
}

impl Dispatcher {
    #[must_use]
    pub fn new(provider: Arc<dyn VfsProvider>) -> Self {
        Self {
            provider,
            caller_aware: None,
            handles: HandleRegistry::new(),
        }
    }

    /// Forward caller identity to the provider on every request, for a
    /// provider stack whose interception layer wants to see the
    /// guest's uid/gid rather than the host process identity.
    #[must_use]
    pub fn with_caller_aware(mut self, caller_aware: Arc<dyn CallerAware>) -> Self {
        self.caller_aware = Some(caller_aware);
        self
    }

    fn handle_for(&self, request: &Request) -> Result<matchlock_vfs::Handle, VfsError> {
        request
            .handle
            .and_then(|h| self.handles.resolve(h))
            .ok_or(VfsError::BadHandle)
    }

    /// Run one request to completion, never propagating a Rust error:
    /// every failure is folded into `Response.err`.
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.run(&request).await {
            Ok(response) => response,
            Err(err) => Response::error(err.errno()),
        }
    }

    async fn run(&self, request: &Request) -> Result<Response, VfsError> {
        if let Some(caller_aware) = &self.caller_aware {
            caller_aware.set_caller(request.uid, request.gid);
        }

        match request.op {
            Op::Lookup | Op::Getattr => {
                let stat = self.provider.stat(&request.path).await?;
                Ok(Response {
                    stat: Some(WireStat::from(stat)),
                    ..Response::ok()
                })
            }
            Op::Setattr => {
                let mode = request.mode.unwrap_or(0);
                let stat = self.provider.setattr(&request.path, mode).await?;
                Ok(Response {
                    stat: Some(WireStat::from(stat)),
                    ..Response::ok()
                })
            }
            Op::Readdir => {
                let entries = self.provider.readdir(&request.path).await?;
                Ok(Response {
                    entries: Some(entries.into_iter().map(WireDirEntry::from).collect()),
                    ..Response::ok()
                })
            }
            Op::Mkdir => {
                let mode = request.mode.unwrap_or(0o755);
                self.provider.mkdir(&request.path, mode).await?;
                // A follow-up stat failing (e.g. due to a hook block)
                // is still a successful mkdir from the caller's view.
                let stat = self.provider.stat(&request.path).await.ok();
                Ok(Response {
                    stat: stat.map(WireStat::from),
                    ..Response::ok()
                })
            }
            Op::MkdirAll => {
                let mode = request.mode.unwrap_or(0o755);
                self.provider.mkdir_all(&request.path, mode).await?;
                Ok(Response::ok())
            }
            Op::Create => {
                let mode = request.mode.unwrap_or(0o644);
                let (stat, handle) = self.provider.create(&request.path, mode).await?;
                let guest_handle = self.handles.register(handle);
                Ok(Response {
                    stat: Some(WireStat::from(stat)),
                    handle: Some(guest_handle),
                    ..Response::ok()
                })
            }
            Op::Open => {
                let write = request.flags.unwrap_or(0) & 0b01 != 0;
                let truncate = request.flags.unwrap_or(0) & 0b10 != 0;
                let handle = self.provider.open(&request.path, write, truncate).await?;
                let guest_handle = self.handles.register(handle);
                Ok(Response {
                    handle: Some(guest_handle),
                    ..Response::ok()
                })
            }
            Op::Read => {
                let handle = self.handle_for(request)?;
                let offset = request.offset.unwrap_or(0);
                let size = request.size.unwrap_or(0);
                let data = self.provider.read(handle, offset, size).await?;
                Ok(Response {
                    data: Some(data),
                    ..Response::ok()
                })
            }
            Op::Write => {
                let handle = self.handle_for(request)?;
                let offset = request.offset.unwrap_or(0);
                let data = request.data.as_deref().unwrap_or(&[]);
                let written = self.provider.write(handle, offset, data).await?;
                Ok(Response {
                    written: Some(written),
                    ..Response::ok()
                })
            }
            Op::Fsync => {
                let handle = self.handle_for(request)?;
                self.provider.fsync(handle).await?;
                Ok(Response::ok())
            }
            Op::Release => {
                let handle = self.handle_for(request)?;
                self.provider.release(handle).await?;
                if request.handle.is_some_and(|h| self.handles.forget(h).is_none()) {
                    warn!(path = %request.path, "release for a handle the registry had already forgotten");
                }
                Ok(Response::ok())
            }
            Op::Truncate => {
                let size = request.size.map(u64::from).or(request.offset).unwrap_or(0);
                self.provider.truncate(&request.path, size).await?;
                Ok(Response::ok())
            }
            Op::Unlink => {
                self.provider.unlink(&request.path).await?;
                Ok(Response::ok())
            }
            Op::Rmdir => {
                self.provider.rmdir(&request.path).await?;
                Ok(Response::ok())
            }
            Op::Rename => {
                let to = request.new_path.as_deref().ok_or_else(|| {
                    VfsError::NotSupported("rename requires new-path".into())
                })?;
                self.provider.rename(&request.path, to).await?;
                Ok(Response::ok())
            }
            Op::Symlink => {
                let target = request.new_path.as_deref().ok_or_else(|| {
                    VfsError::NotSupported("symlink requires new-path as target".into())
                })?;
                self.provider.symlink(target, &request.path).await?;
                Ok(Response::ok())
            }
            Op::Readlink => {
                let target = self.provider.readlink(&request.path).await?;
                Ok(Response {
                    data: Some(target.into_bytes()),
                    ..Response::ok()
                })
            }
            Op::Link => {
                let link_path = request.new_path.as_deref().ok_or_else(|| {
                    VfsError::NotSupported("link requires new-path".into())
                })?;
                self.provider.link(&request.path, link_path).await?;
                Ok(Response::ok())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchlock_vfs::MemoryVfs;

    #[tokio::test]
    async fn create_write_read_round_trip_via_requests() {
        let dispatcher = Dispatcher::new(Arc::new(MemoryVfs::new()));

        let create = dispatcher
            .dispatch(Request::new(Op::Create, "/f"))
            .await;
        assert_eq!(create.err, 0);
        let handle = create.handle.unwrap();

        let mut write_req = Request::new(Op::Write, "/f");
        write_req.handle = Some(handle);
        write_req.data = Some(b"hello".to_vec());
        let write_resp = dispatcher.dispatch(write_req).await;
        assert_eq!(write_resp.written, Some(5));

        let mut read_req = Request::new(Op::Read, "/f");
        read_req.handle = Some(handle);
        read_req.size = Some(64);
        let read_resp = dispatcher.dispatch(read_req).await;
        assert_eq!(read_resp.data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn unknown_handle_maps_to_bad_handle_errno() {
        let dispatcher = Dispatcher::new(Arc::new(MemoryVfs::new()));
        let mut req = Request::new(Op::Read, "/f");
        req.handle = Some(999);
        let resp = dispatcher.dispatch(req).await;
        assert_eq!(resp.err, VfsError::BadHandle.errno());
    }

    #[tokio::test]
    async fn release_forgets_the_guest_handle() {
        let dispatcher = Dispatcher::new(Arc::new(MemoryVfs::new()));
        let create = dispatcher.dispatch(Request::new(Op::Create, "/f")).await;
        let handle = create.handle.unwrap();

        let mut release_req = Request::new(Op::Release, "/f");
        release_req.handle = Some(handle);
        assert_eq!(dispatcher.dispatch(release_req).await.err, 0);

        let mut read_req = Request::new(Op::Read, "/f");
        read_req.handle = Some(handle);
        assert_eq!(dispatcher.dispatch(read_req).await.err, VfsError::BadHandle.errno());
    }
}
