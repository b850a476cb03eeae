//! BlueZ GATT application exposing a `Session` as the HTTP Proxy Service
//!
//! | characteristic | properties    | handler                          |
//! |----------------|---------------|----------------------------------|
//! | URI            | write         | `Session::write_uri`             |
//! | Headers        | read, write   | `read_headers` / `write_headers` |
//! | Entity Body    | read, write   | `read_body` / `write_body`       |
//! | Control Point  | write, notify | `write_control` / notifications  |

use std::time::Duration;

use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicNotifier, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, CharacteristicReadRequest, CharacteristicWrite,
    CharacteristicWriteMethod, ReqError, Service,
};
use futures::FutureExt;
use tracing::{debug, info};

use hps_proto::ControlError;
use hps_proto::ble::{BODY_UUID, CONTROL_POINT_UUID, HEADERS_UUID, SERVICE_UUID, URI_UUID};

use crate::config::Config;
use crate::session::{NotifyError, Notifier, Session, SessionError};

/// Keeps the service registered and advertised until dropped
pub struct Peripheral {
    _advertisement: AdvertisementHandle,
    _application: ApplicationHandle,
}

/// Register the service on the default adapter and start advertising
pub async fn serve(session: &Session, config: &Config) -> bluer::Result<Peripheral> {
    let bluez = bluer::Session::new().await?;
    let adapter = bluez.default_adapter().await?;
    adapter.set_powered(true).await?;

    info!(
        adapter = adapter.name(),
        address = %adapter.address().await?,
        device_name = %config.device_name,
        "starting HTTP proxy service"
    );

    let application = adapter.serve_gatt_application(application(session)).await?;
    let advertisement = adapter
        .advertise(Advertisement {
            service_uuids: [SERVICE_UUID].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(config.device_name.clone()),
            ..Default::default()
        })
        .await?;

    Ok(Peripheral {
        _advertisement: advertisement,
        _application: application,
    })
}

pub fn application(session: &Session) -> Application {
    Application {
        services: vec![Service {
            uuid: SERVICE_UUID,
            primary: true,
            characteristics: vec![
                uri_characteristic(session),
                headers_characteristic(session),
                body_characteristic(session),
                control_point_characteristic(session),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn uri_characteristic(session: &Session) -> Characteristic {
    Characteristic {
        uuid: URI_UUID,
        write: Some(write_with(session, |session, value| {
            session.write_uri(&value);
            Ok(())
        })),
        ..Default::default()
    }
}

fn headers_characteristic(session: &Session) -> Characteristic {
    Characteristic {
        uuid: HEADERS_UUID,
        read: Some(read_with(session, Session::read_headers)),
        write: Some(write_with(session, |session, value| {
            session.write_headers(&value);
            Ok(())
        })),
        ..Default::default()
    }
}

fn body_characteristic(session: &Session) -> Characteristic {
    Characteristic {
        uuid: BODY_UUID,
        read: Some(read_with(session, Session::read_body)),
        write: Some(write_with(session, |session, value| {
            session.write_body(&value);
            Ok(())
        })),
        ..Default::default()
    }
}

fn control_point_characteristic(session: &Session) -> Characteristic {
    let notify_session = session.clone();
    Characteristic {
        uuid: CONTROL_POINT_UUID,
        write: Some(write_with(session, |session, value| {
            session.write_control(&value).map_err(req_error)
        })),
        notify: Some(CharacteristicNotify {
            notify: true,
            indicate: true,
            method: CharacteristicNotifyMethod::Fun(Box::new(move |notifier| {
                let session = notify_session.clone();
                async move {
                    debug!(uuid = %CONTROL_POINT_UUID, "central subscribed");
                    tokio::spawn(async move {
                        session.serve_notifications(GattNotifier(notifier)).await;
                    });
                }
                .boxed()
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn write_with<F>(session: &Session, f: F) -> CharacteristicWrite
where
    F: Fn(&Session, Vec<u8>) -> Result<(), ReqError> + Send + Sync + 'static,
{
    let session = session.clone();
    let f = std::sync::Arc::new(f);
    CharacteristicWrite {
        write: true,
        write_without_response: true,
        method: CharacteristicWriteMethod::Fun(Box::new(move |value, req| {
            let session = session.clone();
            let f = f.clone();
            async move {
                debug!(?req, len = value.len(), "write request");
                f(&session, value)
            }
            .boxed()
        })),
        ..Default::default()
    }
}

fn read_with(session: &Session, f: fn(&Session) -> Vec<u8>) -> CharacteristicRead {
    let session = session.clone();
    CharacteristicRead {
        read: true,
        fun: Box::new(move |req: CharacteristicReadRequest| {
            let value = f(&session);
            async move {
                debug!(?req, len = value.len(), "read request");
                Ok::<_, ReqError>(value.get(req.offset as usize..).map(<[u8]>::to_vec).unwrap_or_default())
            }
            .boxed()
        }),
        ..Default::default()
    }
}

fn req_error(e: SessionError) -> ReqError {
    match e {
        SessionError::Busy => ReqError::InProgress,
        SessionError::Control(ControlError::Empty) => ReqError::InvalidValueLength,
        SessionError::Control(_) | SessionError::CancelUnsupported => ReqError::NotSupported,
    }
}

/// Bound on how late an unsubscribe is noticed while idle. A new
/// subscription replaces the old loop at once, so only an idle session
/// carries a stopped loop for this long.
const STOP_POLL: Duration = Duration::from_millis(100);

struct GattNotifier(CharacteristicNotifier);

impl Notifier for GattNotifier {
    async fn notify(&mut self, value: Vec<u8>) -> Result<(), NotifyError> {
        if self.0.is_stopped() {
            return Err(NotifyError("notification session stopped".to_string()));
        }
        self.0
            .notify(value)
            .await
            .map_err(|e| NotifyError(e.to_string()))
    }

    async fn stopped(&mut self) {
        while !self.0.is_stopped() {
            tokio::time::sleep(STOP_POLL).await;
        }
    }
}
