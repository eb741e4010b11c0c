// The external RPC surface: newline-delimited JSON over localhost TCP, one
// endpoint per actor. Requests are `{"method": ..., "params": [...]}`;
// responses carry either a `result` or an `error` string. Service errors
// travel as faults and are never caught on the simulator side.

use crate::arena::ArenaService;
use crate::debug_rpc;
use crate::robot::RobotService;
use crate::vec3::Vector3;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// One fiducial marker as it crosses the process boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerDict {
    #[serde(rename = "Corners")]
    pub corners: [Vector3; 4],
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "Size")]
    pub size: f64,
}

/// Everything a robot client needs to rebuild marker objects from one
/// exposure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionFrame {
    #[serde(rename = "Resolution")]
    pub resolution: (u32, u32),
    #[serde(rename = "Field of View")]
    pub field_of_view: f64,
    #[serde(rename = "Camera Position")]
    pub camera_position: Vector3,
    #[serde(rename = "Camera Normal")]
    pub camera_normal: Vector3,
    #[serde(rename = "Timestamp")]
    pub timestamp: f64,
    #[serde(rename = "List of Markers")]
    pub markers: Vec<MarkerDict>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn from_result(result: Value) -> Response {
        Response {
            result: Some(result),
            error: None,
        }
    }

    fn fault(message: String) -> Response {
        Response {
            result: None,
            error: Some(message),
        }
    }
}

/// Dispatches one decoded request. Suspending operations block the endpoint
/// thread, which is exactly the actor's thread.
pub trait Handler: Send + 'static {
    fn handle(&self, method: &str, params: &[Value]) -> Result<Value, String>;
}

struct EndpointShared {
    shutdown: AtomicBool,
    live: Mutex<Option<TcpStream>>,
    addr: SocketAddr,
}

/// A served endpoint. Dropping it leaks the serving thread; call
/// [`Endpoint::shutdown`] for a clean exit.
pub struct Endpoint {
    url: String,
    shared: Arc<EndpointShared>,
    thread: JoinHandle<()>,
}

impl Endpoint {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Closes the live connection (if any), unsticks a pending accept and
    /// joins the serving thread.
    pub fn shutdown(self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(stream) = self.shared.live.lock().expect("endpoint poisoned").as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        let _ = TcpStream::connect(self.shared.addr);
        let _ = self.thread.join();
    }
}

/// Binds a fresh localhost port and serves `handler` on a new thread, one
/// client at a time.
pub fn spawn_endpoint<H: Handler>(name: &str, handler: H) -> io::Result<Endpoint> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let addr = listener.local_addr()?;
    let shared = Arc::new(EndpointShared {
        shutdown: AtomicBool::new(false),
        live: Mutex::new(None),
        addr,
    });
    let serving = shared.clone();
    let thread = thread::Builder::new()
        .name(format!("{name}-endpoint"))
        .spawn(move || serve(listener, serving, handler))?;
    Ok(Endpoint {
        url: format!("tcp://{addr}"),
        shared,
        thread,
    })
}

fn serve<H: Handler>(listener: TcpListener, shared: Arc<EndpointShared>, handler: H) {
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(_) => break,
        };
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        debug_rpc!("client {peer} connected");
        if let Ok(clone) = stream.try_clone() {
            *shared.live.lock().expect("endpoint poisoned") = Some(clone);
        }
        serve_connection(stream, &handler);
        *shared.live.lock().expect("endpoint poisoned") = None;
        debug_rpc!("client {peer} disconnected");
    }
}

fn serve_connection<H: Handler>(stream: TcpStream, handler: &H) {
    let reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(_) => return,
    };
    let mut writer = stream;
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug_rpc!("dispatching {}", request.method);
                match handler.handle(&request.method, &request.params) {
                    Ok(result) => Response::from_result(result),
                    Err(message) => Response::fault(message),
                }
            }
            Err(error) => Response::fault(format!("malformed request: {error}")),
        };
        let Ok(text) = serde_json::to_string(&response) else {
            break;
        };
        let sent = writer
            .write_all(text.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if sent.is_err() {
            break;
        }
    }
}

/// The robot endpoints spawned over the arena's lifetime, so they can all be
/// torn down when the simulator exits.
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    endpoints: Arc<Mutex<Vec<Endpoint>>>,
}

impl EndpointRegistry {
    pub fn new() -> EndpointRegistry {
        EndpointRegistry::default()
    }

    pub fn add(&self, endpoint: Endpoint) {
        self.endpoints
            .lock()
            .expect("registry poisoned")
            .push(endpoint);
    }

    pub fn shutdown_all(&self) {
        let drained: Vec<Endpoint> = self
            .endpoints
            .lock()
            .expect("registry poisoned")
            .drain(..)
            .collect();
        for endpoint in drained {
            endpoint.shutdown();
        }
    }
}

fn param_f64(params: &[Value], index: usize) -> Result<f64, String> {
    params
        .get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("parameter {index} must be a number"))
}

fn param_usize(params: &[Value], index: usize) -> Result<usize, String> {
    params
        .get(index)
        .and_then(Value::as_u64)
        .map(|value| value as usize)
        .ok_or_else(|| format!("parameter {index} must be a non-negative integer"))
}

fn param_str<'a>(params: &'a [Value], index: usize) -> Result<&'a str, String> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("parameter {index} must be a string"))
}

struct ArenaHandler {
    service: ArenaService,
    registry: EndpointRegistry,
}

impl Handler for ArenaHandler {
    fn handle(&self, method: &str, params: &[Value]) -> Result<Value, String> {
        match method {
            "createRobot" => {
                let team = param_usize(params, 0)?;
                let robot = self.service.create_robot(team).map_err(|e| e.to_string())?;
                let endpoint = spawn_robot_endpoint(robot).map_err(|e| e.to_string())?;
                let url = endpoint.url().to_string();
                self.registry.add(endpoint);
                Ok(json!(url))
            }
            "waitForStart" => Ok(json!(self.service.wait_for_start())),
            "waitForOutput" => {
                let duration = param_f64(params, 0)?;
                let (running, messages) = self.service.wait_for_output(duration);
                Ok(json!([json!(running), json!(messages)]))
            }
            "getScores" => self
                .service
                .get_scores()
                .map(|scores| json!(scores))
                .map_err(|e| e.to_string()),
            "terminate" => self
                .service
                .terminate()
                .map(|done| json!(done))
                .map_err(|e| e.to_string()),
            _ => Err(format!("unknown arena method {method:?}")),
        }
    }
}

/// Serves the controller-facing operations and spawns one robot endpoint per
/// createRobot call.
pub fn spawn_arena_endpoint(
    service: ArenaService,
    registry: EndpointRegistry,
) -> io::Result<Endpoint> {
    spawn_endpoint("arena", ArenaHandler { service, registry })
}

struct RobotHandler {
    service: RobotService,
}

impl Handler for RobotHandler {
    fn handle(&self, method: &str, params: &[Value]) -> Result<Value, String> {
        match method {
            "getTeamNumber" => Ok(json!(self.service.team_number())),
            "getMotorPower" => {
                let motor = param_usize(params, 0)? as u32;
                self.service
                    .motor_power(motor)
                    .map(|power| json!(power))
                    .map_err(|e| e.to_string())
            }
            "setMotorPower" => {
                let motor = param_usize(params, 0)? as u32;
                let power = params.get(1).and_then(Value::as_f64).ok_or_else(|| {
                    "attempted to set motor power to a non-numeric value".to_string()
                })?;
                self.service
                    .set_motor_power(motor, power)
                    .map(|clamped| json!(clamped))
                    .map_err(|e| e.to_string())
            }
            "print" => {
                let message = param_str(params, 0)?;
                self.service
                    .print(message)
                    .map(|done| json!(done))
                    .map_err(|e| e.to_string())
            }
            "sleep" => {
                let seconds = param_f64(params, 0)?;
                self.service
                    .sleep(seconds)
                    .map(|running| json!(running))
                    .map_err(|e| e.to_string())
            }
            "see" => {
                let resolution: (u32, u32) = params
                    .first()
                    .cloned()
                    .and_then(|value| serde_json::from_value(value).ok())
                    .ok_or_else(|| "parameter 0 must be a [width, height] pair".to_string())?;
                self.service
                    .see(resolution)
                    .map(|frame| json!(frame))
                    .map_err(|e| e.to_string())
            }
            "waitForStart" => Ok(json!(self.service.wait_for_start())),
            _ => Err(format!("unknown robot method {method:?}")),
        }
    }
}

pub fn spawn_robot_endpoint(service: RobotService) -> io::Result<Endpoint> {
    let name = format!("robot-{}", service.team_number());
    spawn_endpoint(&name, RobotHandler { service })
}
