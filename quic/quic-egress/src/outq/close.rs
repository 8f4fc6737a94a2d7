// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Close orchestration: CONNECTION_CLOSE production and the terminal
//! socket transition.

use crate::{
    event::Event,
    frame::Frame,
    level::EncryptionLevel,
    outq::{Context, OutQueue, SocketState},
    transport,
};

impl OutQueue {
    /// Closes the connection with a transport error.
    ///
    /// The application gets the event first; if it absorbs it, the
    /// close is considered delivered and nothing goes on the wire.
    /// Otherwise the error is cached, a CONNECTION_CLOSE frame is sent
    /// at `level` and the socket goes terminal.
    pub fn transmit_close<C: Context>(
        &mut self,
        ctx: &mut C,
        frame_type: u64,
        errcode: u64,
        level: EncryptionLevel,
    ) {
        ensure!(errcode != transport::Error::NO_ERROR);

        let event = Event::ConnectionClose {
            errcode,
            frame_type,
        };
        ensure!(ctx.event_recv(event).is_err());

        let error = transport::Error::new(errcode)
            .with_frame_type(frame_type)
            .with_reason(self.close.reason.clone());

        tracing::debug!(error = %error, ?level, "transmitting connection close");

        let frame = Frame::connection_close(
            level,
            error.code,
            error.frame_type,
            false,
            error.reason.clone(),
        );
        self.close = error;
        self.ctrl_tail(ctx, frame, false);

        let _ = self.state.on_close();
    }

    /// Closes the connection on behalf of the application.
    ///
    /// Suppressed on idle timeout and on a peer-initiated close (the
    /// caller owns that distinction). During the handshake an
    /// application close surfaces as a transport APPLICATION_ERROR at
    /// the Initial level, since 1-RTT keys don't exist yet.
    pub fn transmit_app_close<C: Context>(&mut self, ctx: &mut C, errcode: u64) {
        let reason = self.close.reason.clone();

        match self.state {
            SocketState::Established => {
                self.close = transport::Error::new(errcode).with_reason(reason.clone());
                let frame = Frame::connection_close(
                    EncryptionLevel::ApplicationData,
                    errcode,
                    0,
                    true,
                    reason,
                );
                self.ctrl_tail(ctx, frame, false);
            }
            SocketState::Handshaking => {
                // the application's code is cached; the wire carries
                // the transport-space stand-in
                self.close = transport::Error::new(errcode).with_reason(reason.clone());
                let frame = Frame::connection_close(
                    EncryptionLevel::Initial,
                    transport::Error::APPLICATION_ERROR,
                    0,
                    false,
                    reason,
                );
                self.ctrl_tail(ctx, frame, false);
            }
            // nothing to tell the peer
            SocketState::Idle | SocketState::Closed => return,
        }

        tracing::debug!(error = %self.close, "transmitting application close");

        let _ = self.state.on_close();
    }
}
