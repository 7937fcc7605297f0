
mod test_frame_transform;
mod test_executor;
