//! Zoom meeting service implementation.

use psiclinic_common::services::{BoxFuture, MeetingCreated, MeetingRequest, MeetingService};
use psiclinic_common::ProviderError;

use crate::client::ZoomClient;

pub struct ZoomMeetingService {
    client: ZoomClient,
}

impl ZoomMeetingService {
    pub fn new(client: ZoomClient) -> Self {
        Self { client }
    }
}

impl MeetingService for ZoomMeetingService {
    fn create_meeting(
        &self,
        request: MeetingRequest,
    ) -> BoxFuture<'_, MeetingCreated, ProviderError> {
        Box::pin(async move { Ok(self.client.create_meeting(&request).await?) })
    }
}
