//! Recording mock of the native layer shared by the integration tests.
//!
//! - Handles are recycled: a destroyed or released handle value is handed out
//!   again by the next `create`, like a native allocator reusing addresses.
//! - Every native call is recorded so tests can assert that none was made.
//! - Failures can be injected per operation name.
//! - Map requests answer `Ready` unless pending maps are switched on. Request
//!   tokens are kept so tests can complete them later, in any order.
//! - Submissions complete only when a test asks for it.

#![allow(dead_code)]

use std::collections::HashMap;

use parking_lot::Mutex;

use gpu_warden::{
    BufferDescriptor, BufferId, BufferUsages, DeviceDescriptor, DeviceId, DriverEvent, Handle,
    MapAsyncStatus, MapMode, MapStatus, MapToken, MappedRange, NativeCommand, NativeDescriptor,
    NativeDriver, NativeError, NativeLogLevel, NativeResult, ResourceKind, SubmissionId, Warden,
    WardenConfig,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Create(ResourceKind, Handle),
    Destroy(ResourceKind, Handle),
    Release(ResourceKind, Handle),
    Map(Handle, MapMode, MappedRange),
    Unmap(Handle),
    ReadMapped(Handle),
    WriteMapped(Handle),
    WriteBuffer(Handle, Handle),
    Encode(Handle, NativeCommand),
    Finish(Handle),
    Submit(Handle, Vec<Handle>, SubmissionId),
    Poll(Handle),
}

#[derive(Default)]
struct MockState {
    next_handle: usize,
    free: Vec<Handle>,
    live: HashMap<Handle, ResourceKind>,
    calls: Vec<Call>,
    failures: HashMap<&'static str, NativeError>,
    pending_maps: bool,
    map_requests: Vec<MapToken>,
    devices: HashMap<Handle, DeviceId>,
    queued: Vec<DriverEvent>,
    submitted: Vec<SubmissionId>,
    memory: HashMap<Handle, Vec<u8>>,
    log_level: Option<NativeLogLevel>,
}

#[derive(Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `op` fail with `code`.
    pub fn fail_next(&self, op: &'static str, code: i32) {
        self.state
            .lock()
            .failures
            .insert(op, NativeError::with_message(code, format!("injected {op} failure")));
    }

    pub fn set_pending_maps(&self, pending: bool) {
        self.state.lock().pending_maps = pending;
    }

    /// Returned by the next `poll` of any device.
    pub fn queue_event(&self, event: DriverEvent) {
        self.state.lock().queued.push(event);
    }

    /// Token of the most recent map request.
    pub fn last_map_request(&self) -> MapToken {
        *self
            .state
            .lock()
            .map_requests
            .last()
            .expect("no map request was made")
    }

    /// Queues the completion of the most recent map request.
    pub fn complete_last_map(&self, status: MapAsyncStatus) {
        let request = self.last_map_request();
        self.queue_event(DriverEvent::MapCompleted { request, status });
    }

    /// Queues loss of whichever device currently owns `handle`, the way a
    /// native loss callback would report it.
    pub fn report_device_lost(&self, handle: Handle, reason: &str) {
        let mut state = self.state.lock();
        let device = *state.devices.get(&handle).expect("handle is not a device");
        state.queued.push(DriverEvent::DeviceLost {
            device,
            reason: reason.to_owned(),
        });
    }

    /// Queues `WorkDone` for every submission made so far.
    pub fn complete_all(&self) {
        let mut state = self.state.lock();
        let done: Vec<_> = state.submitted.drain(..).map(DriverEvent::WorkDone).collect();
        state.queued.extend(done);
    }

    /// Submission tokens received and not yet completed, oldest first.
    pub fn submitted(&self) -> Vec<SubmissionId> {
        self.state.lock().submitted.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.state.lock().live.contains_key(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn log_level(&self) -> Option<NativeLogLevel> {
        self.state.lock().log_level
    }

    fn injected(state: &mut MockState, op: &'static str) -> NativeResult<()> {
        match state.failures.remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn free(state: &mut MockState, handle: Handle) {
        if state.live.remove(&handle).is_some() {
            state.memory.remove(&handle);
            state.devices.remove(&handle);
            state.free.push(handle);
        }
    }
}

impl NativeDriver for MockDriver {
    fn create(
        &self,
        _parent: Option<Handle>,
        descriptor: &NativeDescriptor<'_>,
    ) -> NativeResult<Handle> {
        let mut state = self.state.lock();
        Self::injected(&mut state, "create")?;

        let handle = match state.free.pop() {
            Some(handle) => handle,
            None => {
                state.next_handle += 0x100;
                Handle::new(state.next_handle).ok_or_else(|| NativeError::new(-1))?
            }
        };
        let kind = descriptor.kind();
        state.live.insert(handle, kind);
        if let NativeDescriptor::Buffer(desc) = descriptor {
            state.memory.insert(handle, vec![0; desc.size as usize]);
        }
        state.calls.push(Call::Create(kind, handle));
        Ok(handle)
    }

    fn destroy(&self, kind: ResourceKind, handle: Handle) -> NativeResult<()> {
        let mut state = self.state.lock();
        Self::injected(&mut state, "destroy")?;
        state.calls.push(Call::Destroy(kind, handle));
        Self::free(&mut state, handle);
        Ok(())
    }

    fn release(&self, kind: ResourceKind, handle: Handle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Release(kind, handle));
        Self::injected(&mut state, "release")?;
        Self::free(&mut state, handle);
        Ok(())
    }

    fn device_registered(&self, handle: Handle, device: DeviceId) {
        self.state.lock().devices.insert(handle, device);
    }

    fn map_buffer(
        &self,
        buffer: Handle,
        mode: MapMode,
        range: MappedRange,
        request: MapToken,
    ) -> NativeResult<MapStatus> {
        let mut state = self.state.lock();
        Self::injected(&mut state, "map")?;
        state.calls.push(Call::Map(buffer, mode, range));
        state.map_requests.push(request);
        Ok(if state.pending_maps {
            MapStatus::Pending
        } else {
            MapStatus::Ready
        })
    }

    fn unmap_buffer(&self, buffer: Handle) -> NativeResult<()> {
        let mut state = self.state.lock();
        Self::injected(&mut state, "unmap")?;
        state.calls.push(Call::Unmap(buffer));
        Ok(())
    }

    fn read_mapped(&self, buffer: Handle, offset: u64, data: &mut [u8]) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::ReadMapped(buffer));
        let memory = state.memory.get(&buffer).ok_or_else(|| NativeError::new(-2))?;
        let start = offset as usize;
        data.copy_from_slice(&memory[start..start + data.len()]);
        Ok(())
    }

    fn write_mapped(&self, buffer: Handle, offset: u64, data: &[u8]) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::WriteMapped(buffer));
        let memory = state
            .memory
            .get_mut(&buffer)
            .ok_or_else(|| NativeError::new(-2))?;
        let start = offset as usize;
        memory[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn write_buffer(
        &self,
        queue: Handle,
        buffer: Handle,
        offset: u64,
        data: &[u8],
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        Self::injected(&mut state, "write_buffer")?;
        state.calls.push(Call::WriteBuffer(queue, buffer));
        if let Some(memory) = state.memory.get_mut(&buffer) {
            let start = offset as usize;
            memory[start..start + data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    fn encode(&self, encoder: Handle, command: &NativeCommand) -> NativeResult<()> {
        let mut state = self.state.lock();
        Self::injected(&mut state, "encode")?;
        state.calls.push(Call::Encode(encoder, *command));
        Ok(())
    }

    fn finish_encoder(&self, encoder: Handle) -> NativeResult<Handle> {
        let mut state = self.state.lock();
        Self::injected(&mut state, "finish")?;
        state.calls.push(Call::Finish(encoder));
        // Command buffers live outside the tracked handle space.
        Handle::new(encoder.get() | 0x1).ok_or_else(|| NativeError::new(-1))
    }

    fn submit(
        &self,
        queue: Handle,
        command_buffers: &[Handle],
        token: SubmissionId,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        Self::injected(&mut state, "submit")?;
        state
            .calls
            .push(Call::Submit(queue, command_buffers.to_vec(), token));
        state.submitted.push(token);
        Ok(())
    }

    fn poll(&self, device: Handle) -> Vec<DriverEvent> {
        let mut state = self.state.lock();
        state.calls.push(Call::Poll(device));
        std::mem::take(&mut state.queued)
    }

    fn set_log_level(&self, level: NativeLogLevel) {
        self.state.lock().log_level = Some(level);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn warden() -> Warden<MockDriver> {
    warden_with(WardenConfig::default())
}

pub fn warden_with(config: WardenConfig) -> Warden<MockDriver> {
    init_logging();
    Warden::new(MockDriver::new(), config)
}

pub fn device(warden: &Warden<MockDriver>) -> DeviceId {
    warden
        .create_device(&DeviceDescriptor {
            label: Some("test device"),
            ..Default::default()
        })
        .expect("device")
}

pub fn buffer(warden: &Warden<MockDriver>, device: DeviceId, usage: BufferUsages) -> BufferId {
    warden
        .create_buffer(
            device,
            &BufferDescriptor {
                label: Some("test buffer"),
                size: 256,
                usage,
                mapped_at_creation: false,
            },
        )
        .expect("buffer")
}

/// Submits one encoder that records a use of `resources`.
pub fn submit_using(
    warden: &Warden<MockDriver>,
    device: DeviceId,
    resources: &[gpu_warden::ResourceRef],
) -> SubmissionId {
    let encoder = warden.create_command_encoder(device, None).expect("encoder");
    warden.record_use(encoder, resources).expect("record");
    warden.finish(encoder).expect("finish");
    let queue = warden.device_queue(device).expect("queue");
    warden
        .submit(queue, &[encoder])
        .expect("submit")
        .expect("non-empty submission")
}

/// Handle returned by the most recent native `create` of `kind`.
pub fn created_handle(warden: &Warden<MockDriver>, kind: ResourceKind) -> Handle {
    warden
        .driver()
        .calls()
        .iter()
        .rev()
        .find_map(|call| match call {
            Call::Create(created, handle) if *created == kind => Some(*handle),
            _ => None,
        })
        .expect("no such create call")
}
