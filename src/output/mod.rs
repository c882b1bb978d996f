pub mod dispatcher;
pub mod pubsub;
pub mod recording;
pub mod sink;
pub mod timeseries;

pub use dispatcher::{ConnectionState, Delivery, Dispatcher, DispatcherState};
pub use pubsub::{topic_for, MqttBackend, PubSubBackend, PubSubSink};
pub use recording::{RecordingPubSub, RecordingTimeSeries};
pub use sink::Sink;
pub use timeseries::{to_data_point, InfluxDbBackend, Point, TimeSeriesBackend, TimeSeriesSink};
