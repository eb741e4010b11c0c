// Reference clients for both endpoints. The controller and the robot
// programs are separate processes in a real run; these links speak the same
// wire protocol, and double as the in-repo harness for end-to-end tests.

use crate::marker::{self, Marker};
use crate::rpc::{Request, Response, VisionFrame};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("remote fault: {0}")]
    Fault(String),
}

/// One line-delimited JSON connection to an endpoint.
pub struct RpcClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl RpcClient {
    pub fn connect(url: &str) -> Result<RpcClient, ClientError> {
        let address = url
            .strip_prefix("tcp://")
            .ok_or_else(|| ClientError::Protocol(format!("unsupported url {url:?}")))?;
        let stream = TcpStream::connect(address)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(RpcClient {
            reader,
            writer: stream,
        })
    }

    pub fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        let request = Request {
            method: method.to_string(),
            params,
        };
        let mut text = serde_json::to_string(&request)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        text.push('\n');
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(ClientError::Protocol("connection closed".to_string()));
        }
        let response: Response =
            serde_json::from_str(&line).map_err(|e| ClientError::Protocol(e.to_string()))?;
        if let Some(fault) = response.error {
            return Err(ClientError::Fault(fault));
        }
        response
            .result
            .ok_or_else(|| ClientError::Protocol("response carried no result".to_string()))
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Protocol(e.to_string()))
}

/// The controller's view of the arena endpoint.
pub struct ArenaLink {
    rpc: RpcClient,
}

impl ArenaLink {
    pub fn connect(url: &str) -> Result<ArenaLink, ClientError> {
        Ok(ArenaLink {
            rpc: RpcClient::connect(url)?,
        })
    }

    /// Returns the URL of the new robot's endpoint.
    pub fn create_robot(&mut self, team: usize) -> Result<String, ClientError> {
        decode(self.rpc.call("createRobot", vec![json!(team)])?)
    }

    pub fn wait_for_start(&mut self) -> Result<bool, ClientError> {
        decode(self.rpc.call("waitForStart", vec![])?)
    }

    pub fn wait_for_output(&mut self, seconds: f64) -> Result<(bool, Vec<String>), ClientError> {
        decode(self.rpc.call("waitForOutput", vec![json!(seconds)])?)
    }

    pub fn get_scores(&mut self) -> Result<[i32; 4], ClientError> {
        decode(self.rpc.call("getScores", vec![])?)
    }

    pub fn terminate(&mut self) -> Result<bool, ClientError> {
        decode(self.rpc.call("terminate", vec![])?)
    }
}

/// A robot program's view of its own endpoint, mirroring the API of a real
/// robot.
pub struct RobotLink {
    rpc: RpcClient,
    team: usize,
}

impl RobotLink {
    pub fn connect(url: &str) -> Result<RobotLink, ClientError> {
        let mut rpc = RpcClient::connect(url)?;
        let team = decode(rpc.call("getTeamNumber", vec![])?)?;
        Ok(RobotLink { rpc, team })
    }

    /// The team number, which is also the zone the robot starts in.
    pub fn zone(&self) -> usize {
        self.team
    }

    pub fn motor(&mut self, motor: u32) -> Result<f64, ClientError> {
        decode(self.rpc.call("getMotorPower", vec![json!(motor)])?)
    }

    /// Returns the power actually stored, after clamping.
    pub fn set_motor(&mut self, motor: u32, power: f64) -> Result<f64, ClientError> {
        decode(
            self.rpc
                .call("setMotorPower", vec![json!(motor), json!(power)])?,
        )
    }

    pub fn print(&mut self, message: &str) -> Result<bool, ClientError> {
        decode(self.rpc.call("print", vec![json!(message)])?)
    }

    /// Returns whether the simulation is still running.
    pub fn sleep(&mut self, seconds: f64) -> Result<bool, ClientError> {
        decode(self.rpc.call("sleep", vec![json!(seconds)])?)
    }

    /// Takes a picture and rebuilds the markers, classified for this team.
    pub fn see(&mut self, resolution: (u32, u32)) -> Result<Vec<Marker>, ClientError> {
        let frame = self.see_frame(resolution)?;
        Ok(marker::markers_from_frame(&frame, self.team))
    }

    /// The raw vision payload, for callers that want the wire data.
    pub fn see_frame(&mut self, resolution: (u32, u32)) -> Result<VisionFrame, ClientError> {
        decode(self.rpc.call(
            "see",
            vec![json!([resolution.0, resolution.1])],
        )?)
    }

    pub fn wait_for_start(&mut self) -> Result<bool, ClientError> {
        decode(self.rpc.call("waitForStart", vec![])?)
    }
}
