//! Ties the parser, decoder and [`Status`] together into the surface a
//! USB host stack actually calls: descriptor-seen, report-arrived,
//! device-info-seen, device-removed. Everything here is a thin,
//! non-blocking dispatcher — no I/O, no USB protocol state (§5/§6).

use std::sync::{Mutex, RwLock};

use crate::binding::FieldBinding;
use crate::decoder::ReportDecoder;
use crate::parser::{DescriptorParser, ParserConfig};
use crate::status::Status;
use crate::strings::decode_device_string_descriptor;

/// The live binding table plus everything needed to apply it, shared
/// between whatever thread/task owns the USB callbacks and whatever
/// reads [`Status`]. Bindings change rarely (attach/detach); reports
/// arrive often, so the binding table sits behind an `RwLock` while
/// `Status` keeps its own internal mutex.
pub struct Bus {
    parser: DescriptorParser,
    decoder: ReportDecoder,
    bindings: RwLock<Vec<FieldBinding>>,
    status: Status,
    attach_lock: Mutex<()>,
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new(ParserConfig::default(), ReportDecoder::default())
    }
}

impl Bus {
    pub fn new(parser_config: ParserConfig, decoder: ReportDecoder) -> Self {
        Bus {
            parser: DescriptorParser::new(parser_config),
            decoder,
            bindings: RwLock::new(Vec::new()),
            status: Status::new(),
            attach_lock: Mutex::new(()),
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Call once per attached device, with the raw HID report
    /// descriptor bytes read from the device. On a parse failure the
    /// error is logged and any bindings built so far are discarded —
    /// the bus stays attachable and keeps reporting offline (§7).
    pub fn on_descriptor(&self, descriptor: &[u8]) {
        let _guard = self.attach_lock.lock().unwrap_or_else(|p| p.into_inner());
        match self.parser.parse(descriptor) {
            Ok(bindings) => {
                log::info!("descriptor parsed: {} bound field(s)", bindings.len());
                *self.bindings.write().unwrap_or_else(|p| p.into_inner()) = bindings;
            }
            Err(err) => {
                log::warn!("descriptor parse failed, device left unbound: {err}");
                self.bindings.write().unwrap_or_else(|p| p.into_inner()).clear();
            }
        }
    }

    /// Call once per attached device with the manufacturer/product/serial
    /// string descriptors (as read via the standard GET_DESCRIPTOR(STRING)
    /// request). Flips the bus to `connected` — a device with a parsed
    /// descriptor but no string info reported yet is still "offline" in
    /// [`Status::to_json`] until this is called.
    pub fn on_device_info(&self, manufacturer: &[u8], product: &[u8], serial: &[u8]) {
        let manufacturer = decode_device_string_descriptor(manufacturer);
        let product = decode_device_string_descriptor(product);
        let serial = decode_device_string_descriptor(serial);
        log::info!("device attached: {manufacturer} {product} ({serial})");
        self.status.mark_attached(manufacturer, product, serial);
    }

    /// Call for every HID input report delivered on the interrupt IN
    /// endpoint. Decode errors are logged, never propagated — a
    /// malformed report must not take down the caller's poll loop.
    pub fn on_report(&self, report: &[u8]) {
        let bindings = self.bindings.read().unwrap_or_else(|p| p.into_inner());
        if bindings.is_empty() {
            return;
        }
        if let Err(err) = self.decoder.decode(&bindings, report, &self.status) {
            log::warn!("report decode failed: {err}");
        }
    }

    /// Call when the device is unplugged / unbound. Drops the binding
    /// table and resets [`Status`] to offline.
    pub fn on_device_removed(&self) {
        let _guard = self.attach_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.bindings.write().unwrap_or_else(|p| p.into_inner()).clear();
        self.status.clear();
        log::info!("device removed");
    }
}
