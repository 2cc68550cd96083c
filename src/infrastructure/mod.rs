pub mod searchad_client;
