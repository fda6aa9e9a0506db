//! External-scaler wire protocol
//!
//! Message and service definitions for the KEDA `externalscaler.ExternalScaler`
//! gRPC contract, maintained by hand in the shape tonic would generate so the
//! build does not depend on `protoc` being available.

pub mod externalscaler {
    /// Identifies the scale target. `scaler_metadata` carries at minimum the
    /// `workload` key; `metricName` optionally overrides the reported metric
    /// name.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ScaledObjectRef {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub namespace: String,
        #[prost(map = "string, string", tag = "3")]
        pub scaler_metadata: ::std::collections::HashMap<String, String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct IsActiveResponse {
        #[prost(bool, tag = "1")]
        pub result: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetMetricSpecResponse {
        #[prost(message, repeated, tag = "1")]
        pub metric_specs: Vec<MetricSpec>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MetricSpec {
        #[prost(string, tag = "1")]
        pub metric_name: String,
        #[prost(int64, tag = "2")]
        pub target_size: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetMetricsRequest {
        #[prost(message, optional, tag = "1")]
        pub scaled_object_ref: Option<ScaledObjectRef>,
        #[prost(string, tag = "2")]
        pub metric_name: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetMetricsResponse {
        #[prost(message, repeated, tag = "1")]
        pub metric_values: Vec<MetricValue>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MetricValue {
        #[prost(string, tag = "1")]
        pub metric_name: String,
        #[prost(int64, tag = "2")]
        pub metric_value: i64,
    }

    /// Client for the external-scaler service.
    pub mod external_scaler_client {
        use super::*;
        use tonic::codegen::*;

        #[derive(Debug, Clone)]
        pub struct ExternalScalerClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl ExternalScalerClient<tonic::transport::Channel> {
            pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
            where
                D: TryInto<tonic::transport::Endpoint>,
                D::Error: Into<StdError>,
            {
                let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
                Ok(Self::new(conn))
            }

            pub fn new(channel: tonic::transport::Channel) -> Self {
                let inner = tonic::client::Grpc::new(channel);
                Self { inner }
            }
        }

        impl<T> ExternalScalerClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        {
            pub async fn is_active(
                &mut self,
                request: impl tonic::IntoRequest<ScaledObjectRef>,
            ) -> Result<tonic::Response<IsActiveResponse>, tonic::Status> {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/externalscaler.ExternalScaler/IsActive",
                );
                self.inner.unary(request.into_request(), path, codec).await
            }

            pub async fn get_metric_spec(
                &mut self,
                request: impl tonic::IntoRequest<ScaledObjectRef>,
            ) -> Result<tonic::Response<GetMetricSpecResponse>, tonic::Status> {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/externalscaler.ExternalScaler/GetMetricSpec",
                );
                self.inner.unary(request.into_request(), path, codec).await
            }

            pub async fn get_metrics(
                &mut self,
                request: impl tonic::IntoRequest<GetMetricsRequest>,
            ) -> Result<tonic::Response<GetMetricsResponse>, tonic::Status> {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/externalscaler.ExternalScaler/GetMetrics",
                );
                self.inner.unary(request.into_request(), path, codec).await
            }
        }
    }

    /// Server glue for the external-scaler service.
    pub mod external_scaler_server {
        use super::*;
        use tonic::codegen::*;

        /// The three wire methods the host autoscaler calls.
        #[async_trait]
        pub trait ExternalScaler: Send + Sync + 'static {
            async fn is_active(
                &self,
                request: tonic::Request<ScaledObjectRef>,
            ) -> Result<tonic::Response<IsActiveResponse>, tonic::Status>;

            async fn get_metric_spec(
                &self,
                request: tonic::Request<ScaledObjectRef>,
            ) -> Result<tonic::Response<GetMetricSpecResponse>, tonic::Status>;

            async fn get_metrics(
                &self,
                request: tonic::Request<GetMetricsRequest>,
            ) -> Result<tonic::Response<GetMetricsResponse>, tonic::Status>;
        }

        #[derive(Debug)]
        pub struct ExternalScalerServer<T: ExternalScaler> {
            inner: Arc<T>,
        }

        impl<T: ExternalScaler> ExternalScalerServer<T> {
            pub fn new(inner: T) -> Self {
                Self::from_arc(Arc::new(inner))
            }

            pub fn from_arc(inner: Arc<T>) -> Self {
                Self { inner }
            }

            pub fn with_interceptor<F>(inner: T, interceptor: F) -> InterceptedService<Self, F>
            where
                F: tonic::service::Interceptor,
            {
                InterceptedService::new(Self::new(inner), interceptor)
            }
        }

        impl<T, B> Service<http::Request<B>> for ExternalScalerServer<T>
        where
            T: ExternalScaler,
            B: Body + Send + 'static,
            B::Error: Into<StdError> + Send + 'static,
        {
            type Response = http::Response<tonic::body::BoxBody>;
            type Error = std::convert::Infallible;
            type Future = BoxFuture<Self::Response, Self::Error>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, req: http::Request<B>) -> Self::Future {
                match req.uri().path() {
                    "/externalscaler.ExternalScaler/IsActive" => {
                        #[allow(non_camel_case_types)]
                        struct IsActiveSvc<T: ExternalScaler>(pub Arc<T>);
                        impl<T: ExternalScaler> tonic::server::UnaryService<ScaledObjectRef>
                            for IsActiveSvc<T>
                        {
                            type Response = IsActiveResponse;
                            type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                            fn call(
                                &mut self,
                                request: tonic::Request<ScaledObjectRef>,
                            ) -> Self::Future {
                                let inner = Arc::clone(&self.0);
                                Box::pin(async move { inner.is_active(request).await })
                            }
                        }
                        let inner = Arc::clone(&self.inner);
                        Box::pin(async move {
                            let method = IsActiveSvc(inner);
                            let codec = tonic::codec::ProstCodec::default();
                            let mut grpc = tonic::server::Grpc::new(codec);
                            Ok(grpc.unary(method, req).await)
                        })
                    }
                    "/externalscaler.ExternalScaler/GetMetricSpec" => {
                        #[allow(non_camel_case_types)]
                        struct GetMetricSpecSvc<T: ExternalScaler>(pub Arc<T>);
                        impl<T: ExternalScaler> tonic::server::UnaryService<ScaledObjectRef>
                            for GetMetricSpecSvc<T>
                        {
                            type Response = GetMetricSpecResponse;
                            type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                            fn call(
                                &mut self,
                                request: tonic::Request<ScaledObjectRef>,
                            ) -> Self::Future {
                                let inner = Arc::clone(&self.0);
                                Box::pin(async move { inner.get_metric_spec(request).await })
                            }
                        }
                        let inner = Arc::clone(&self.inner);
                        Box::pin(async move {
                            let method = GetMetricSpecSvc(inner);
                            let codec = tonic::codec::ProstCodec::default();
                            let mut grpc = tonic::server::Grpc::new(codec);
                            Ok(grpc.unary(method, req).await)
                        })
                    }
                    "/externalscaler.ExternalScaler/GetMetrics" => {
                        #[allow(non_camel_case_types)]
                        struct GetMetricsSvc<T: ExternalScaler>(pub Arc<T>);
                        impl<T: ExternalScaler> tonic::server::UnaryService<GetMetricsRequest>
                            for GetMetricsSvc<T>
                        {
                            type Response = GetMetricsResponse;
                            type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                            fn call(
                                &mut self,
                                request: tonic::Request<GetMetricsRequest>,
                            ) -> Self::Future {
                                let inner = Arc::clone(&self.0);
                                Box::pin(async move { inner.get_metrics(request).await })
                            }
                        }
                        let inner = Arc::clone(&self.inner);
                        Box::pin(async move {
                            let method = GetMetricsSvc(inner);
                            let codec = tonic::codec::ProstCodec::default();
                            let mut grpc = tonic::server::Grpc::new(codec);
                            Ok(grpc.unary(method, req).await)
                        })
                    }
                    _ => Box::pin(async move {
                        Ok(http::Response::builder()
                            .status(200)
                            .header("grpc-status", tonic::Code::Unimplemented as i32)
                            .header("content-type", "application/grpc")
                            .body(empty_body())
                            .unwrap())
                    }),
                }
            }
        }

        impl<T: ExternalScaler> Clone for ExternalScalerServer<T> {
            fn clone(&self) -> Self {
                Self {
                    inner: Arc::clone(&self.inner),
                }
            }
        }

        impl<T: ExternalScaler> tonic::server::NamedService for ExternalScalerServer<T> {
            const NAME: &'static str = "externalscaler.ExternalScaler";
        }
    }
}

pub use externalscaler::external_scaler_client::ExternalScalerClient;
pub use externalscaler::external_scaler_server::{ExternalScaler, ExternalScalerServer};
pub use externalscaler::*;
