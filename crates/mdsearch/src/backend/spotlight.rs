//! macOS Spotlight (`MDQuery`) backend.
//!
//! The predicate is rendered to Spotlight query syntax and executed
//! asynchronously on a dedicated run-loop thread. The "did finish"
//! notification drives the gather listener. The query keeps its results
//! until `stop()`, which ends the run loop and joins the thread so that
//! `MDQueryStop` never overlaps a result read. Results stay readable after
//! `stop()` until the query handle is dropped.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use core_foundation_sys::array::{kCFTypeArrayCallBacks, CFArrayCreate, CFArrayRef};
use core_foundation_sys::base::{
    kCFAllocatorDefault, Boolean, CFAllocatorRef, CFGetTypeID, CFIndex, CFOptionFlags, CFRelease,
    CFRetain, CFTypeRef,
};
use core_foundation_sys::date::{CFDateGetAbsoluteTime, CFDateGetTypeID, CFDateRef};
use core_foundation_sys::number::{
    kCFNumberSInt64Type, CFNumberGetTypeID, CFNumberGetValue, CFNumberRef,
};
use core_foundation_sys::runloop::{
    kCFRunLoopDefaultMode, kCFRunLoopRunFinished, CFRunLoopGetCurrent, CFRunLoopRef,
    CFRunLoopRunInMode, CFRunLoopStop,
};
use core_foundation_sys::string::{
    kCFStringEncodingUTF8, CFStringCreateWithBytes, CFStringGetCString, CFStringGetLength,
    CFStringGetMaximumSizeForEncoding, CFStringGetTypeID, CFStringRef,
};
use parking_lot::{Condvar, Mutex};

use super::{
    AttributeValue, GatherListener, GatherNotifier, MetadataBackend, MetadataQuery, QueryPlan,
    RawRecord, SubscriptionId,
};
use crate::error::Result;
use crate::query::{Attribute, SearchScope};

// ---------------------------------------------------------------------------
// MDQuery and notification center C API
// ---------------------------------------------------------------------------

type MDQueryRef = *mut c_void;
type MDItemRef = *const c_void;
type CFNotificationCenterRef = *mut c_void;

type CFNotificationCallback = extern "C" fn(
    center: CFNotificationCenterRef,
    observer: *mut c_void,
    name: CFStringRef,
    object: *const c_void,
    user_info: *const c_void,
);

const CF_NOTIFICATION_DELIVER_IMMEDIATELY: CFIndex = 4;

/// Seconds between the Unix epoch and the Core Foundation reference date.
const CF_ABSOLUTE_TIME_UNIX_OFFSET: f64 = 978_307_200.0;

/// How long one run-loop pass may block before re-checking for stop.
const RUN_LOOP_SLICE_SECS: f64 = 0.25;

#[link(name = "CoreServices", kind = "framework")]
extern "C" {
    static kMDQueryDidFinishNotification: CFStringRef;
    static kMDQueryScopeComputer: CFStringRef;

    fn MDQueryCreate(
        allocator: CFAllocatorRef,
        query_string: CFStringRef,
        value_list_attrs: CFArrayRef,
        sorting_attrs: CFArrayRef,
    ) -> MDQueryRef;
    fn MDQuerySetSearchScope(query: MDQueryRef, scope_directories: CFArrayRef, scope_options: u32);
    fn MDQueryExecute(query: MDQueryRef, option_flags: CFOptionFlags) -> Boolean;
    fn MDQueryStop(query: MDQueryRef);
    fn MDQueryDisableUpdates(query: MDQueryRef);
    fn MDQueryEnableUpdates(query: MDQueryRef);
    fn MDQueryGetResultCount(query: MDQueryRef) -> CFIndex;
    fn MDQueryGetResultAtIndex(query: MDQueryRef, index: CFIndex) -> *const c_void;
    fn MDItemCopyAttribute(item: MDItemRef, name: CFStringRef) -> CFTypeRef;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFNotificationCenterGetLocalCenter() -> CFNotificationCenterRef;
    fn CFNotificationCenterAddObserver(
        center: CFNotificationCenterRef,
        observer: *const c_void,
        callback: CFNotificationCallback,
        name: CFStringRef,
        object: *const c_void,
        suspension_behavior: CFIndex,
    );
    fn CFNotificationCenterRemoveObserver(
        center: CFNotificationCenterRef,
        observer: *const c_void,
        name: CFStringRef,
        object: *const c_void,
    );
}

// ---------------------------------------------------------------------------
// Send/Sync wrappers
// ---------------------------------------------------------------------------

/// Safety: `CFRunLoopStop` may be called from any thread.
#[derive(Clone, Copy)]
struct SendableRunLoop(CFRunLoopRef);
unsafe impl Send for SendableRunLoop {}
unsafe impl Sync for SendableRunLoop {}

/// Safety: result reads are bracketed by `MDQueryDisableUpdates`, and each
/// owner (query handle, run-loop thread) holds its own retain.
struct SendableQuery(MDQueryRef);
unsafe impl Send for SendableQuery {}
unsafe impl Sync for SendableQuery {}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Backend backed by the system Spotlight index.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpotlightBackend;

impl SpotlightBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataBackend for SpotlightBackend {
    fn open(&self, plan: QueryPlan) -> Result<Arc<dyn MetadataQuery>> {
        Ok(Arc::new(self.open_query(plan)))
    }
}

impl SpotlightBackend {
    fn open_query(&self, plan: QueryPlan) -> SpotlightQuery {
        let query_string = plan.predicate.to_string();
        let scopes: Vec<String> = plan
            .scopes
            .iter()
            .filter_map(|scope| match scope {
                SearchScope::IndexedVolume => None,
                SearchScope::Directory(path) => Some(path.to_string_lossy().to_string()),
            })
            .collect();
        let whole_volume = plan.scopes.contains(&SearchScope::IndexedVolume);

        // Safety: every CF object created here is released before returning;
        // the query itself is owned by `SpotlightQuery`.
        let query = unsafe {
            let cf_query = str_to_cfstring(&query_string);
            let sort_key = str_to_cfstring(plan.order.attribute.key());
            let sort_array = cf_array(&[sort_key]);
            let query = MDQueryCreate(kCFAllocatorDefault, cf_query, ptr::null(), sort_array);
            CFRelease(sort_array as *const c_void);
            CFRelease(sort_key as *const c_void);
            CFRelease(cf_query as *const c_void);

            if !query.is_null() {
                if whole_volume || scopes.is_empty() {
                    let scope_array = cf_array(&[kMDQueryScopeComputer]);
                    MDQuerySetSearchScope(query, scope_array, 0);
                    CFRelease(scope_array as *const c_void);
                } else {
                    let cf_scopes: Vec<CFStringRef> =
                        scopes.iter().map(|scope| str_to_cfstring(scope)).collect();
                    let scope_array = cf_array(&cf_scopes);
                    MDQuerySetSearchScope(query, scope_array, 0);
                    CFRelease(scope_array as *const c_void);
                    for cf_scope in cf_scopes {
                        CFRelease(cf_scope as *const c_void);
                    }
                }
            }
            query
        };

        log::debug!("spotlight query opened: {query_string}");

        SpotlightQuery {
            query: SendableQuery(query),
            query_string,
            ascending: plan.order.ascending,
            shared: Arc::new(SpotlightShared {
                notifier: GatherNotifier::new(),
                stopped: AtomicBool::new(false),
                run_loop: Mutex::new(None),
            }),
            started: AtomicBool::new(false),
            start_error: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }
}

struct SpotlightShared {
    notifier: GatherNotifier,
    stopped: AtomicBool,
    /// Set while the run-loop thread is alive.
    run_loop: Mutex<Option<SendableRunLoop>>,
}

struct SpotlightQuery {
    query: SendableQuery,
    query_string: String,
    ascending: bool,
    shared: Arc<SpotlightShared>,
    started: AtomicBool,
    start_error: Mutex<Option<String>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Outcome of the run-loop thread's startup, handed back to `start()`.
type Handshake = Arc<(Mutex<Option<std::result::Result<(), String>>>, Condvar)>;

impl SpotlightQuery {
    fn refuse(&self, reason: String) -> bool {
        log::warn!("spotlight refused query: {reason}");
        *self.start_error.lock() = Some(reason);
        false
    }

    /// Runs `read` with live updates paused.
    fn with_updates_disabled<T>(&self, read: impl FnOnce(MDQueryRef) -> T) -> Option<T> {
        let query = self.query.0;
        if query.is_null() {
            return None;
        }
        // Safety: `query` is a valid MDQueryRef until `Drop`.
        unsafe {
            MDQueryDisableUpdates(query);
            let value = read(query);
            MDQueryEnableUpdates(query);
            Some(value)
        }
    }
}

impl MetadataQuery for SpotlightQuery {
    fn subscribe(&self, listener: GatherListener) -> SubscriptionId {
        self.shared.notifier.subscribe(listener)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.shared.notifier.unsubscribe(subscription);
    }

    fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.refuse("query was already started".to_string());
        }
        if self.query.0.is_null() {
            return self.refuse(format!("query string rejected: {}", self.query_string));
        }

        let handshake: Handshake = Arc::new((Mutex::new(None), Condvar::new()));
        let thread_handshake = handshake.clone();
        let shared = self.shared.clone();
        // The run-loop thread holds its own reference, released on exit.
        // Safety: `self.query` is non-null and valid.
        let query = SendableQuery(unsafe { CFRetain(self.query.0 as CFTypeRef) } as MDQueryRef);

        let spawned = thread::Builder::new()
            .name("mdsearch-spotlight".to_string())
            .spawn(move || run_query(query, shared, thread_handshake));
        match spawned {
            Ok(handle) => *self.worker.lock() = Some(handle),
            Err(error) => {
                // Safety: the thread never ran, so its reference is still ours.
                unsafe { CFRelease(self.query.0 as CFTypeRef) };
                return self.refuse(format!("unable to spawn run loop thread: {error}"));
            }
        }

        let (lock, cvar) = &*handshake;
        let mut outcome = lock.lock();
        while outcome.is_none() {
            cvar.wait(&mut outcome);
        }
        match outcome.take() {
            Some(Ok(())) => true,
            Some(Err(reason)) => self.refuse(reason),
            None => self.refuse("run loop thread exited without reporting".to_string()),
        }
    }

    fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // The thread clears the slot under this lock before it exits.
        if let Some(run_loop) = *self.shared.run_loop.lock() {
            // Safety: CFRunLoopStop is thread-safe.
            unsafe { CFRunLoopStop(run_loop.0) };
        }
        // The thread runs MDQueryStop on its way out; reads must not overlap it.
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                log::warn!("spotlight run loop thread panicked");
            }
        }
    }

    fn result_count(&self) -> usize {
        self.with_updates_disabled(|query| unsafe { MDQueryGetResultCount(query) })
            .map(|count| count.max(0) as usize)
            .unwrap_or(0)
    }

    fn result_at(&self, index: usize) -> Option<RawRecord> {
        let ascending = self.ascending;
        self.with_updates_disabled(|query| unsafe {
            let count = MDQueryGetResultCount(query).max(0) as usize;
            if index >= count {
                return None;
            }
            // Spotlight sorts ascending only.
            let position = if ascending { index } else { count - 1 - index };
            let item = MDQueryGetResultAtIndex(query, position as CFIndex);
            if item.is_null() {
                return None;
            }
            Some(read_item(item))
        })
        .flatten()
    }

    fn start_error(&self) -> Option<String> {
        self.start_error.lock().clone()
    }
}

impl Drop for SpotlightQuery {
    fn drop(&mut self) {
        self.stop();
        if !self.query.0.is_null() {
            // Safety: the run-loop thread holds its own retain.
            unsafe { CFRelease(self.query.0 as CFTypeRef) };
        }
    }
}

// ---------------------------------------------------------------------------
// Run-loop thread
// ---------------------------------------------------------------------------

fn run_query(query: SendableQuery, shared: Arc<SpotlightShared>, handshake: Handshake) {
    let publish = |outcome: std::result::Result<(), String>| {
        let (lock, cvar) = &*handshake;
        *lock.lock() = Some(outcome);
        cvar.notify_all();
    };

    // Safety: all FFI calls below follow the documented CoreServices API
    // contract. The observer pointer is an `Arc` leaked for the lifetime of
    // the registration and reclaimed after it is removed.
    unsafe {
        let query = query.0;
        let center = CFNotificationCenterGetLocalCenter();
        let observer = Arc::into_raw(shared.clone()) as *const c_void;
        CFNotificationCenterAddObserver(
            center,
            observer,
            gather_finished,
            kMDQueryDidFinishNotification,
            query as *const c_void,
            CF_NOTIFICATION_DELIVER_IMMEDIATELY,
        );

        let remove_observer = || {
            CFNotificationCenterRemoveObserver(
                center,
                observer,
                kMDQueryDidFinishNotification,
                query as *const c_void,
            );
            drop(Arc::from_raw(observer as *const SpotlightShared));
        };

        if MDQueryExecute(query, 0) == 0 {
            remove_observer();
            CFRelease(query as CFTypeRef);
            publish(Err("MDQueryExecute failed".to_string()));
            return;
        }
        *shared.run_loop.lock() = Some(SendableRunLoop(CFRunLoopGetCurrent()));
        publish(Ok(()));

        // Runs until `stop()`, even after gathering finished, so the query is
        // only stopped once the owner is done reading. Short slices so a stop
        // issued before the loop first runs is seen.
        while !shared.stopped.load(Ordering::SeqCst) {
            let result = CFRunLoopRunInMode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE_SECS, 0);
            if result == kCFRunLoopRunFinished {
                thread::sleep(Duration::from_millis(10));
            }
        }

        shared.run_loop.lock().take();
        MDQueryStop(query);
        remove_observer();
        CFRelease(query as CFTypeRef);
    }
    log::debug!("spotlight run loop exited");
}

extern "C" fn gather_finished(
    _center: CFNotificationCenterRef,
    observer: *mut c_void,
    _name: CFStringRef,
    _object: *const c_void,
    _user_info: *const c_void,
) {
    // Safety: `observer` is the `Arc<SpotlightShared>` registered in
    // `run_query`, alive until the observer is removed.
    let shared = unsafe { &*(observer as *const SpotlightShared) };
    if !shared.stopped.load(Ordering::SeqCst) {
        shared.notifier.notify();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

unsafe fn read_item(item: MDItemRef) -> RawRecord {
    let mut record = RawRecord::new();
    for attribute in Attribute::RECORD {
        let key = str_to_cfstring(attribute.key());
        let value = MDItemCopyAttribute(item, key);
        CFRelease(key as *const c_void);
        if value.is_null() {
            continue;
        }
        if let Some(value) = convert_value(value) {
            record.set(attribute, value);
        }
        CFRelease(value);
    }
    record
}

unsafe fn convert_value(value: CFTypeRef) -> Option<AttributeValue> {
    let type_id = CFGetTypeID(value);
    if type_id == CFStringGetTypeID() {
        cfstring_to_string(value as CFStringRef).map(AttributeValue::Text)
    } else if type_id == CFNumberGetTypeID() {
        let mut number: i64 = 0;
        let ok = CFNumberGetValue(
            value as CFNumberRef,
            kCFNumberSInt64Type,
            &mut number as *mut i64 as *mut c_void,
        );
        (ok && number >= 0).then(|| AttributeValue::Bytes(number as u64))
    } else if type_id == CFDateGetTypeID() {
        let seconds = CFDateGetAbsoluteTime(value as CFDateRef) + CF_ABSOLUTE_TIME_UNIX_OFFSET;
        DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0) as i64).map(AttributeValue::Time)
    } else {
        None
    }
}

unsafe fn cfstring_to_string(value: CFStringRef) -> Option<String> {
    let length = CFStringGetLength(value);
    let capacity = CFStringGetMaximumSizeForEncoding(length, kCFStringEncodingUTF8) + 1;
    let mut buffer = vec![0 as c_char; capacity.max(1) as usize];
    if CFStringGetCString(value, buffer.as_mut_ptr(), capacity, kCFStringEncodingUTF8) == 0 {
        return None;
    }
    Some(CStr::from_ptr(buffer.as_ptr()).to_string_lossy().into_owned())
}

unsafe fn cf_array(values: &[CFStringRef]) -> CFArrayRef {
    CFArrayCreate(
        kCFAllocatorDefault,
        values.as_ptr() as *const *const c_void,
        values.len() as CFIndex,
        &kCFTypeArrayCallBacks,
    )
}

unsafe fn str_to_cfstring(s: &str) -> CFStringRef {
    CFStringCreateWithBytes(
        kCFAllocatorDefault,
        s.as_ptr(),
        s.len() as CFIndex,
        kCFStringEncodingUTF8,
        false as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Attribute, OrderSpec, Predicate};
    use tempfile::TempDir;

    fn open_in(dir: &TempDir) -> SpotlightQuery {
        SpotlightBackend::new().open_query(QueryPlan {
            predicate: Predicate::contains(Attribute::FileName, "mdsearch-no-such-file"),
            scopes: vec![SearchScope::Directory(dir.path().to_path_buf())],
            order: OrderSpec::default(),
        })
    }

    #[test]
    fn stop_joins_the_run_loop_thread() {
        let dir = TempDir::new().expect("tempdir");
        let query = open_in(&dir);
        assert!(query.start(), "start failed: {:?}", query.start_error());
        assert!(query.worker.lock().is_some());

        query.stop();

        assert!(query.worker.lock().is_none());
        assert!(query.shared.run_loop.lock().is_none());
        assert_eq!(query.result_count(), 0);
        assert!(query.result_at(0).is_none());
    }

    #[test]
    fn stop_before_start_does_not_block() {
        let dir = TempDir::new().expect("tempdir");
        let query = open_in(&dir);
        query.stop();
        assert!(query.worker.lock().is_none());
    }
}
